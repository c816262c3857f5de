//! voxchat terminal entry point.
//!
//! Press Enter to start recording. Press Enter again to stop and classify the
//! emotion only, or type what you said and press Enter to stop and chat.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, tick, unbounded, Receiver};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use voxchat_app::{
    settings::{default_settings_path, load_settings, save_settings},
    AppSettings, Conversation, InferenceClient, Outcome, Role, VoiceChat,
};
use voxchat_core::{
    audio::{
        device::{list_input_devices, sort_for_display},
        CaptureConfig,
    },
    AudioActivityEvent, CaptureSession,
};

const DEFAULT_LOG_FILTER: &str = "voxchat=info,voxchat_core=info,voxchat_app=info";

/// Messages shown by `/history`.
const HISTORY_LINES: usize = 20;

const HELP: &str = "\
Enter           start recording / stop and detect emotion
<text> Enter    while recording: stop and chat with <text>
/history        show recent messages
/clear          clear the conversation
/devices        list input devices
/device [name]  save the preferred input device (used next launch)
/health         ping the backend
/quit           exit";

/// Settings as read from disk (no environment overrides), plus where to
/// write them back.
struct SavedSettings {
    settings: AppSettings,
    path: PathBuf,
}

fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_path = default_settings_path();
    let file_settings = load_settings(&settings_path);
    let mut settings = file_settings.clone();
    settings.apply_env_overrides();
    info!(
        settings = %settings_path.display(),
        api = settings.api_base_url.as_str(),
        device = settings.preferred_input_device.as_deref().unwrap_or("default"),
        "voxchat starting"
    );

    let client = InferenceClient::new(&settings.client_config())
        .context("failed to build HTTP client")?;
    match client.health() {
        Ok(health) => info!(status = health.status.as_str(), "backend reachable"),
        Err(e) => warn!("backend health check failed: {e}"),
    }

    let session = CaptureSession::with_default_device(CaptureConfig {
        preferred_device: settings.preferred_input_device.clone(),
        ..CaptureConfig::default()
    });
    let mut activity_rx = session.subscribe_activity();
    let chat = VoiceChat::new(session, client, Conversation::new(settings.max_messages));
    let mut saved = SavedSettings {
        settings: file_settings,
        path: settings_path,
    };

    let lines = spawn_stdin_reader();
    let meter = tick(Duration::from_millis(250));

    println!("{HELP}");
    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else { break };
                if !handle_line(&chat, &mut saved, line.trim())? {
                    break;
                }
            }
            recv(meter) -> _ => {
                if chat.is_recording() {
                    if let Some(level) = drain_levels(&mut activity_rx) {
                        print_meter(&level);
                    }
                }
            }
        }
    }

    if chat.is_recording() {
        // Discard the in-progress recording; the device is released either way.
        let _ = chat.session().stop();
    }
    info!("voxchat exiting");
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_line(
    chat: &VoiceChat<InferenceClient>,
    saved: &mut SavedSettings,
    line: &str,
) -> Result<bool> {
    match line {
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{HELP}"),
        "/history" => {
            for message in chat.recent_messages(HISTORY_LINES) {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => "bot",
                };
                match &message.emotion {
                    Some(emotion) => println!(
                        "[{}] {who} ({emotion}): {}",
                        message.at.format("%H:%M"),
                        message.content
                    ),
                    None => println!("[{}] {who}: {}", message.at.format("%H:%M"), message.content),
                }
            }
        }
        "/clear" => chat.clear_conversation(),
        "/devices" => {
            let mut devices = list_input_devices();
            sort_for_display(&mut devices);
            if devices.is_empty() {
                println!("no input devices found");
            }
            for device in devices {
                let marker = if device.is_default { "*" } else { " " };
                println!("{marker} {}", device.name);
            }
        }
        "/device" => set_preferred_device(saved, None),
        cmd if cmd.starts_with("/device ") => {
            set_preferred_device(saved, Some(cmd["/device ".len()..].to_string()));
        }
        "/health" => match chat.backend().health() {
            Ok(health) => println!("backend {}: {}", chat.backend().base_url(), health.status),
            Err(e) => println!("backend {} unreachable: {e}", chat.backend().base_url()),
        },
        text if text.starts_with('/') => println!("unknown command {text}; try /help"),
        text if !chat.is_recording() && !text.is_empty() => {
            println!("press Enter to start recording first");
        }
        text => match chat.toggle(text) {
            Ok(Outcome::Recording) => println!("● recording… press Enter to stop"),
            Ok(Outcome::NothingCaptured) => println!("\nno audio captured"),
            Ok(Outcome::Emotion(result)) => println!(
                "\nemotion: {} ({:.0}%)",
                result.emotion,
                result.confidence * 100.0
            ),
            Ok(Outcome::Replied(reply)) => {
                println!("\nyou ({}): {}", reply.emotion, reply.user_text);
                println!("bot: {}", reply.reply_text);
                if let Some(url) = reply.audio_url {
                    println!("     reply audio: {url}");
                }
            }
            Err(e) => {
                warn!("{e:#}");
                println!("\nerror: {e:#}");
            }
        },
    }
    Ok(true)
}

fn set_preferred_device(saved: &mut SavedSettings, device: Option<String>) {
    saved.settings.set_preferred_input_device(device);
    match save_settings(&saved.path, &saved.settings) {
        Ok(()) => println!(
            "preferred device: {} (applies on next launch)",
            saved
                .settings
                .preferred_input_device
                .as_deref()
                .unwrap_or("system default")
        ),
        Err(e) => {
            warn!(path = %saved.path.display(), "failed to save settings: {e}");
            println!("could not save settings: {e}");
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Most recent activity event since the last tick, if any.
fn drain_levels(rx: &mut broadcast::Receiver<AudioActivityEvent>) -> Option<AudioActivityEvent> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(event) => latest = Some(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return latest,
        }
    }
}

fn print_meter(level: &AudioActivityEvent) {
    let filled = ((level.rms * 4.0).min(1.0) * 30.0) as usize;
    print!(
        "\r● {:>5.1}s [{:<30}]",
        level.elapsed_secs,
        "#".repeat(filled)
    );
    let _ = std::io::stdout().flush();
}
