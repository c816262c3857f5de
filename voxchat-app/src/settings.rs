//! Persistent application settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ClientConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub preferred_input_device: Option<String>,
    pub request_timeout_secs: u64,
    pub max_messages: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.into(),
            auth_token: None,
            preferred_input_device: None,
            request_timeout_secs: 60,
            max_messages: 200,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.api_base_url = normalize_api_url(&self.api_base_url);
        self.auth_token = trimmed_non_empty(self.auth_token.as_deref());
        self.preferred_input_device = trimmed_non_empty(self.preferred_input_device.as_deref());
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 600);
        self.max_messages = self.max_messages.clamp(2, 10_000);
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VOXCHAT_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(token) = std::env::var("VOXCHAT_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Ok(device) = std::env::var("VOXCHAT_INPUT_DEVICE") {
            self.preferred_input_device = Some(device);
        }
        self.normalize();
    }

    /// `None` or a blank name selects the system default device.
    pub fn set_preferred_input_device(&mut self, device: Option<String>) {
        self.preferred_input_device = trimmed_non_empty(device.as_deref());
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            auth_token: self.auth_token.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

pub fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_URL.into();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.into()
    } else {
        format!("http://{trimmed}")
    }
}

fn trimmed_non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxchat")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("voxchat")
            .join("settings.json")
    }
}

/// Load settings, falling back to defaults for a missing or unreadable file.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring malformed settings file: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
