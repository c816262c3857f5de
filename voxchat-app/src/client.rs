//! Blocking HTTP client for the inference backend.
//!
//! Every request uploads the recording as multipart part `file`
//! (`audio.wav`, `audio/wav`). The backend answers JSON; non-success
//! responses carry a `detail` field that is surfaced in [`ClientError::Status`].

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use voxchat_core::EncodedAudio;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("chat text is required")]
    EmptyText,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection parameters for [`InferenceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend root, e.g. `http://localhost:8000`. No trailing slash.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            auth_token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// `POST /emotion` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub emotion: String,
    #[serde(default)]
    pub confidence: f32,
    /// Per-label probabilities, when the backend includes them.
    #[serde(default)]
    pub all_emotions: BTreeMap<String, f32>,
}

/// `POST /chat` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub user_text: String,
    pub reply_text: String,
    #[serde(default = "neutral")]
    pub emotion: String,
    #[serde(default)]
    pub confidence: f32,
    /// Synthesized reply speech, if the backend produced any.
    #[serde(default)]
    pub audio_url: Option<String>,
}

fn neutral() -> String {
    "neutral".into()
}

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

pub struct InferenceClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl InferenceClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<HealthStatus> {
        let response = self.authorize(self.http.get(self.endpoint("/health"))).send()?;
        parse_json(response)
    }

    /// Classify the speaker's emotion from the recording alone.
    pub fn detect_emotion(&self, audio: &EncodedAudio) -> Result<EmotionResult> {
        let form = multipart::Form::new().part("file", audio_part(audio)?);
        debug!(bytes = audio.byte_len(), "submitting audio for emotion detection");
        let response = self
            .authorize(self.http.post(self.endpoint("/emotion")))
            .multipart(form)
            .send()?;
        parse_json(response)
    }

    /// Submit the recording plus the user's text and get the assistant reply.
    ///
    /// # Errors
    /// `ClientError::EmptyText` without a request when `text` is blank.
    pub fn chat(&self, audio: &EncodedAudio, text: &str) -> Result<ChatReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyText);
        }
        let form = multipart::Form::new()
            .part("file", audio_part(audio)?)
            .text("text", text.to_string());
        debug!(
            bytes = audio.byte_len(),
            text_len = text.len(),
            "submitting audio for chat"
        );
        let response = self
            .authorize(self.http.post(self.endpoint("/chat")))
            .multipart(form)
            .send()?;
        parse_json(response)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn audio_part(audio: &EncodedAudio) -> Result<multipart::Part> {
    Ok(multipart::Part::bytes(audio.as_bytes().to_vec())
        .file_name(audio.file_name())
        .mime_str(audio.mime_type())?)
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json()?);
    }

    let body = response.text().unwrap_or_default();
    let detail = error_detail(&body);
    warn!(status = status.as_u16(), %detail, "backend returned non-success status");
    Err(ClientError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Pull the `detail` field out of an error body, falling back to the raw text.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "no detail".into(),
        Err(_) => body.trim().to_string(),
    }
}
