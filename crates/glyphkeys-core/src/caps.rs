// Glyphkeys Capitalization
// Physical case filter plus the force-upper flag the two capitalization
// modes drive.

use crate::mode::KeyboardMode;

/// Effective case of a standard key under the current Shift and CapsLock
/// state. Shift inverts whatever CapsLock selects.
pub fn case_filtered(base: char, shift_down: bool, caps_lock_on: bool) -> char {
    if shift_down {
        if caps_lock_on {
            base.to_ascii_lowercase()
        } else {
            base.to_ascii_uppercase()
        }
    } else if caps_lock_on {
        base.to_ascii_uppercase()
    } else {
        base.to_ascii_lowercase()
    }
}

/// The force-upper flag.
///
/// In AutoCapitalization the flag arms after a space (or a forwarded line
/// break) and disarms once a character has consumed it. In
/// AlterCapitalization it toggles on every non-space character; spaces
/// leave it alone so a word break never flips the rhythm. Intercept mode
/// reads whatever the flag holds without advancing it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapsState {
    force_upper: bool,
}

impl CapsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.force_upper
    }

    /// Apply the flag to an already case-filtered character. Does not
    /// advance the flag; call `advance` with the result afterwards.
    pub fn apply(&self, ch: char) -> char {
        if self.force_upper {
            ch.to_ascii_uppercase()
        } else {
            ch
        }
    }

    /// Advance the flag after `resolved` has been produced under `mode`.
    pub fn advance(&mut self, mode: KeyboardMode, resolved: char) {
        match mode {
            KeyboardMode::AutoCapitalization => {
                self.force_upper = resolved == ' ';
            }
            KeyboardMode::AlterCapitalization => {
                if resolved != ' ' {
                    self.force_upper = !self.force_upper;
                }
            }
            _ => {}
        }
    }

    /// Arm the flag directly. Used for sentence boundaries the filter never
    /// sees, like a forwarded Enter.
    pub fn arm(&mut self) {
        self.force_upper = true;
    }

    pub fn reset(&mut self) {
        self.force_upper = false;
    }
}
