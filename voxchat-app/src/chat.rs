//! Record → encode → submit loop behind the single record/send button.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::info;
use voxchat_core::{CaptureSession, EncodedAudio, SessionStatus};

use crate::client::{self, ChatReply, EmotionResult, InferenceClient};
use crate::conversation::{Conversation, Message};

/// The remote side of a voice exchange.
pub trait ChatBackend: Send + Sync {
    fn chat(&self, audio: &EncodedAudio, text: &str) -> client::Result<ChatReply>;
    fn detect_emotion(&self, audio: &EncodedAudio) -> client::Result<EmotionResult>;
}

impl ChatBackend for InferenceClient {
    fn chat(&self, audio: &EncodedAudio, text: &str) -> client::Result<ChatReply> {
        InferenceClient::chat(self, audio, text)
    }

    fn detect_emotion(&self, audio: &EncodedAudio) -> client::Result<EmotionResult> {
        InferenceClient::detect_emotion(self, audio)
    }
}

/// What a press of the record/send button did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Capture started.
    Recording,
    /// Capture stopped but no audio arrived, so nothing was sent.
    NothingCaptured,
    /// Sent without text: only the emotion was classified.
    Emotion(EmotionResult),
    /// Full chat round-trip; both messages were appended to the conversation.
    Replied(ChatReply),
}

pub struct VoiceChat<B: ChatBackend> {
    session: CaptureSession,
    backend: B,
    conversation: Mutex<Conversation>,
}

impl<B: ChatBackend> VoiceChat<B> {
    pub fn new(session: CaptureSession, backend: B, conversation: Conversation) -> Self {
        Self {
            session,
            backend,
            conversation: Mutex::new(conversation),
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_recording(&self) -> bool {
        self.session.status() == SessionStatus::Recording
    }

    /// Start recording when idle; otherwise stop and send with `text`.
    pub fn toggle(&self, text: &str) -> Result<Outcome> {
        if self.is_recording() {
            self.stop_and_send(text)
        } else {
            self.start_recording()?;
            Ok(Outcome::Recording)
        }
    }

    pub fn start_recording(&self) -> Result<()> {
        self.session.start().context("could not start recording")
    }

    /// Stop capture, encode the recording once, and submit it.
    ///
    /// Blank `text` sends the audio to emotion detection only; otherwise the
    /// audio and text go to the chat endpoint and the exchange is recorded.
    pub fn stop_and_send(&self, text: &str) -> Result<Outcome> {
        let recording = self.session.stop().context("could not stop recording")?;
        if recording.buffer().is_empty() {
            info!("recording stopped with no audio; nothing to send");
            return Ok(Outcome::NothingCaptured);
        }

        let audio = recording.encode().context("could not encode recording")?;
        info!(
            bytes = audio.byte_len(),
            secs = audio.duration_secs(),
            "recording encoded"
        );

        if text.trim().is_empty() {
            let result = self
                .backend
                .detect_emotion(&audio)
                .context("emotion request failed")?;
            return Ok(Outcome::Emotion(result));
        }

        let reply = self
            .backend
            .chat(&audio, text)
            .context("chat request failed")?;
        {
            let mut conversation = self.conversation.lock();
            conversation.push_user(
                reply.user_text.clone(),
                Some((reply.emotion.clone(), reply.confidence)),
            );
            conversation.push_assistant(reply.reply_text.clone());
        }
        Ok(Outcome::Replied(reply))
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<Message> {
        self.conversation.lock().messages().to_vec()
    }

    /// The last `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        self.conversation.lock().recent(n).to_vec()
    }

    pub fn clear_conversation(&self) {
        self.conversation.lock().clear();
    }
}
