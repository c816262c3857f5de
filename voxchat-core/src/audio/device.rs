//! Input device enumeration and selection.

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio-cpal")]
use crate::{
    audio::SampleRate,
    error::{Result, VoxchatError},
};

/// Metadata about an audio input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// Pick the input device: the preferred name if present, otherwise the
/// default input device, otherwise the first input the host lists.
///
/// # Errors
/// `VoxchatError::DeviceUnavailable` when the host exposes no input device.
#[cfg(feature = "audio-cpal")]
pub fn select_input_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::warn;

    if let Some(preferred_name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| {
                    d.name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                }) {
                    return Ok(device);
                }
                warn!(
                    "preferred input device '{}' not found, falling back",
                    preferred_name
                );
            }
            Err(e) => {
                warn!("failed to list input devices while resolving preference: {e}");
            }
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| VoxchatError::DeviceUnavailable(e.to_string()))?;
    let fallback = devices
        .next()
        .ok_or_else(|| VoxchatError::DeviceUnavailable("no input device found".into()))?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}

/// Sample formats the capture callback can convert, in order of preference.
#[cfg(feature = "audio-cpal")]
const CAPTURE_FORMATS: [cpal::SampleFormat; 4] = [
    cpal::SampleFormat::F32,
    cpal::SampleFormat::I16,
    cpal::SampleFormat::I32,
    cpal::SampleFormat::U16,
];

/// Rank of a `(channels, format)` layout; lower is better. `None` when the
/// format cannot be captured.
#[cfg(feature = "audio-cpal")]
pub fn layout_rank(channels: u16, format: cpal::SampleFormat) -> Option<(u16, usize)> {
    let format_rank = CAPTURE_FORMATS.iter().position(|f| *f == format)?;
    Some((channels, format_rank))
}

/// Pick the best capturable candidate by [`layout_rank`].
#[cfg(feature = "audio-cpal")]
pub fn best_layout<T>(
    candidates: impl IntoIterator<Item = T>,
    layout: impl Fn(&T) -> (u16, cpal::SampleFormat),
) -> Option<T> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let (channels, format) = layout(&candidate);
            layout_rank(channels, format).map(|rank| (rank, candidate))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, candidate)| candidate)
}

/// Find a supported input configuration that runs natively at `rate`.
///
/// Only formats the callback can convert are considered. Among those, prefers
/// the fewest channels, then f32 samples, so mono f32 devices need no
/// conversion at all.
///
/// # Errors
/// `VoxchatError::DeviceUnavailable` when the device cannot be queried or
/// supports no configuration at `rate`.
#[cfg(feature = "audio-cpal")]
pub fn supported_config_at(
    device: &cpal::Device,
    rate: SampleRate,
) -> Result<cpal::SupportedStreamConfig> {
    use cpal::traits::DeviceTrait;

    let target = cpal::SampleRate(rate.get());
    let ranges = device
        .supported_input_configs()
        .map_err(|e| VoxchatError::DeviceUnavailable(e.to_string()))?;

    let at_rate =
        ranges.filter(|r| r.min_sample_rate() <= target && target <= r.max_sample_rate());
    best_layout(at_rate, |r| (r.channels(), r.sample_format()))
        .map(|r| r.with_sample_rate(target))
        .ok_or_else(|| {
            VoxchatError::DeviceUnavailable(format!("device has no capturable format at {rate}"))
        })
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name
                .map(|name| vec![DeviceInfo { name, is_default: true }])
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Order devices for display: default first, then by name.
pub fn sort_for_display(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}
