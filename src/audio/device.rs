//! Host audio device lookup

use cpal::traits::{DeviceTrait, HostTrait};

use super::error::AudioError;

/// Information about a host audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Display name, also used for selection
    pub name: String,
    /// Whether this is the default device
    pub is_default: bool,
}

/// List available input (capture) devices
pub fn list_input_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    host.input_devices()
        .map(|devices| describe(devices, default_name.as_deref()))
        .unwrap_or_default()
}

/// List available output (playback) devices
pub fn list_output_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    host.output_devices()
        .map(|devices| describe(devices, default_name.as_deref()))
        .unwrap_or_default()
}

fn describe(devices: impl Iterator<Item = cpal::Device>, default_name: Option<&str>) -> Vec<AudioDevice> {
    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let is_default = default_name == Some(name.as_str());
            Some(AudioDevice { name, is_default })
        })
        .collect()
}

/// Resolve an output device by name, or the default device
pub(crate) fn output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".into())),
    }
}

/// Resolve an input device by name, or the default device
pub(crate) fn input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_does_not_panic() {
        // Actual device availability depends on the system
        let _inputs = list_input_devices();
        let _outputs = list_output_devices();
    }
}
