//! Run settings
//!
//! Loaded once at startup from an optional TOML file, then overridden from the
//! command line. Every field has a default so an empty file is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default device-side port, forwarded over adb
const DEFAULT_REMOTE_PORT: u16 = 15010;

/// Default sampling rate for generated, played and recorded audio
const DEFAULT_SAMPLING_RATE: u32 = 44100;

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Device serial passed to adb (None = the only attached device)
    #[serde(default)]
    pub serial: Option<String>,

    /// adb executable
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Host the remote audio client connects to
    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Sampling rate in Hz
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,

    /// Directory under which timestamped report directories are created
    #[serde(default = "default_report_root")]
    pub report_root: PathBuf,

    /// Directory holding `<fn>.py` scripts for `script:` processes
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,

    /// Python interpreter
    #[serde(default = "default_python")]
    pub python: String,

    /// Host playback device name (None = system default)
    #[serde(default)]
    pub playback_device: Option<String>,

    /// Host recording device name (None = system default)
    #[serde(default)]
    pub recording_device: Option<String>,

    /// Run `adb forward` for the remote port before the first case
    #[serde(default = "default_forward_port")]
    pub forward_port: bool,
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}

fn default_remote_port() -> u16 {
    DEFAULT_REMOTE_PORT
}

fn default_sampling_rate() -> u32 {
    DEFAULT_SAMPLING_RATE
}

fn default_report_root() -> PathBuf {
    PathBuf::from("reports")
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_forward_port() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: default_adb_path(),
            remote_host: default_remote_host(),
            remote_port: DEFAULT_REMOTE_PORT,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            report_root: default_report_root(),
            script_dir: default_script_dir(),
            python: default_python(),
            playback_device: None,
            recording_device: None,
            forward_port: true,
        }
    }
}

impl Settings {
    /// Validate the settings values
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.remote_port == 0 {
            return Err("Invalid remote port: 0".to_string());
        }
        if self.sampling_rate == 0 {
            return Err("Invalid sampling rate: 0".to_string());
        }
        Ok(())
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Settings, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings file at {:?}: {}", path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(content: &str) -> Result<Settings, String> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An empty file yields the defaults
    #[test]
    fn test_empty_toml_is_default() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.remote_port, 15010);
        assert_eq!(settings.sampling_rate, 44100);
        assert!(settings.forward_port);
    }

    /// Fields given in the file override the defaults, others stay
    #[test]
    fn test_partial_override() {
        let settings = Settings::from_toml(
            r#"
            serial = "emulator-5554"
            sampling_rate = 48000
            forward_port = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(settings.sampling_rate, 48000);
        assert!(!settings.forward_port);
        assert_eq!(settings.adb_path, "adb");
    }

    /// Zero port or rate is rejected
    #[test]
    fn test_validate_rejects_zero() {
        assert!(Settings::from_toml("remote_port = 0").is_err());
        assert!(Settings::from_toml("sampling_rate = 0").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let settings = Settings::default();
        let text = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(settings, parsed);
    }
}
