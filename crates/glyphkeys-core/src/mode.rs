// Glyphkeys Keyboard Mode
// The five operating modes of the interception engine.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Operating mode, stored as a u8 so the host side and the hook thread can
/// share it through an atomic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum KeyboardMode {
    /// Every key passes through untouched.
    Enabled = 0,
    /// Every key is swallowed.
    Disabled = 1,
    /// Standard keys are replaced through the active font.
    Intercept = 2,
    /// Pass-through with sentence-start capitalization.
    AutoCapitalization = 3,
    /// Pass-through with alternating capitalization.
    AlterCapitalization = 4,
}

impl KeyboardMode {
    /// Decode the atomic representation. Unknown values fall back to
    /// Enabled so a torn write can never leave the keyboard swallowed.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => KeyboardMode::Disabled,
            2 => KeyboardMode::Intercept,
            3 => KeyboardMode::AutoCapitalization,
            4 => KeyboardMode::AlterCapitalization,
            _ => KeyboardMode::Enabled,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Modes that route standard keys through the capitalization filter
    /// and replacement path.
    pub fn intercepts(self) -> bool {
        matches!(
            self,
            KeyboardMode::Intercept
                | KeyboardMode::AutoCapitalization
                | KeyboardMode::AlterCapitalization
        )
    }
}

impl Default for KeyboardMode {
    fn default() -> Self {
        KeyboardMode::Enabled
    }
}
