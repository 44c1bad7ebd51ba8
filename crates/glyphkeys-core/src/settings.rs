// Glyphkeys Settings
// Persisted daemon state: mode, beep, font selection, device filter, and
// hook tuning. Loaded at start, saved on clean exit.

use crate::key::{key_from_name, KeyCode};
use crate::mode::KeyboardMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const POLL_TIMEOUT_DEFAULT_MS: u64 = 100;
const ECHO_TIMEOUT_DEFAULT_MS: u64 = 25;

/// Errors that can occur when loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(String),

    #[error("TOML serialize error: {0}")]
    Serialize(String),

    #[error("unknown key name: {0:?}")]
    UnknownKey(String),

    #[error("{name} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Validated settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mode: KeyboardMode,
    pub beep_on_block: bool,
    /// Font file activated at startup.
    pub current_font: Option<PathBuf>,
    /// Font library directory; defaults to ~/.config/glyphkeys/fonts.
    pub fonts_dir: Option<PathBuf>,
    /// Exact device names or node paths to grab. Empty means auto-detect.
    pub device_filter: Vec<String>,
    pub poll_timeout_ms: u64,
    pub echo_timeout_ms: u64,
    /// Pressing this key releases the grab unconditionally. None disables
    /// the escape hatch.
    pub emergency_eject_key: Option<KeyCode>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: KeyboardMode::Enabled,
            beep_on_block: false,
            current_font: None,
            fonts_dir: None,
            device_filter: Vec::new(),
            poll_timeout_ms: POLL_TIMEOUT_DEFAULT_MS,
            echo_timeout_ms: ECHO_TIMEOUT_DEFAULT_MS,
            // PAUSE: present on most boards, useless to intercept
            emergency_eject_key: Some(KeyCode::new(119)),
        }
    }
}

/// Raw TOML shape. Everything optional; validation happens on conversion.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    keyboard: KeyboardSection,
    #[serde(default)]
    font: FontSection,
    #[serde(default)]
    devices: DevicesSection,
    #[serde(default)]
    hook: HookSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyboardSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<KeyboardMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    beep_on_block: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FontSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DevicesSection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    only: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HookSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    poll_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    echo_timeout_ms: Option<u64>,
    /// Key name, or "none" to disable the eject key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emergency_eject_key: Option<String>,
}

fn check_range(
    name: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<u64, SettingsError> {
    if value < min || value > max {
        return Err(SettingsError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

impl Settings {
    /// Default settings path (~/.config/glyphkeys/settings.toml).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("glyphkeys").join("settings.toml"))
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let raw: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let poll_timeout_ms = match raw.hook.poll_timeout_ms {
            Some(ms) => check_range("poll_timeout_ms", ms, 1, 5000)?,
            None => defaults.poll_timeout_ms,
        };
        let echo_timeout_ms = match raw.hook.echo_timeout_ms {
            Some(ms) => check_range("echo_timeout_ms", ms, 1, 500)?,
            None => defaults.echo_timeout_ms,
        };
        let emergency_eject_key = match raw.hook.emergency_eject_key.as_deref() {
            None => defaults.emergency_eject_key,
            Some("none") | Some("off") => None,
            Some(name) => Some(
                key_from_name(name).ok_or_else(|| SettingsError::UnknownKey(name.to_string()))?,
            ),
        };

        Ok(Self {
            mode: raw.keyboard.mode.unwrap_or(defaults.mode),
            beep_on_block: raw.keyboard.beep_on_block.unwrap_or(defaults.beep_on_block),
            current_font: raw.font.current,
            fonts_dir: raw.font.dir,
            device_filter: raw.devices.only,
            poll_timeout_ms,
            echo_timeout_ms,
            emergency_eject_key,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or fall back to defaults when the file does not
    /// exist yet. A present but broken file is still an error: silently
    /// ignoring it would discard the user's configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        let raw = SettingsToml {
            keyboard: KeyboardSection {
                mode: Some(self.mode),
                beep_on_block: Some(self.beep_on_block),
            },
            font: FontSection {
                current: self.current_font.clone(),
                dir: self.fonts_dir.clone(),
            },
            devices: DevicesSection {
                only: self.device_filter.clone(),
            },
            hook: HookSection {
                poll_timeout_ms: Some(self.poll_timeout_ms),
                echo_timeout_ms: Some(self.echo_timeout_ms),
                emergency_eject_key: Some(match self.emergency_eject_key {
                    Some(key) => key.to_string().to_lowercase(),
                    None => "none".to_string(),
                }),
            },
        };
        toml::to_string_pretty(&raw).map_err(|e| SettingsError::Serialize(e.to_string()))
    }

    /// Write to `path`, creating parent directories on first save.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
