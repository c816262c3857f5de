//! voxchat terminal client.
//!
//! The binary in `main.rs` wires these modules to stdin/stdout; everything
//! here is usable without a terminal.

pub mod chat;
pub mod client;
pub mod conversation;
pub mod settings;

pub use chat::{ChatBackend, Outcome, VoiceChat};
pub use client::{ChatReply, ClientConfig, ClientError, EmotionResult, InferenceClient};
pub use conversation::{Conversation, Message, Role};
pub use settings::AppSettings;
