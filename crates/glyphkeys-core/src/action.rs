// Glyphkeys Key Action
// Press/release/repeat state carried in the event value field.

use std::fmt;

/// The transition a key event reports.
///
/// Values match the kernel's event value field: 0 released, 1 pressed,
/// 2 autorepeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum KeyAction {
    Release = 0,
    Press = 1,
    Repeat = 2,
}

impl KeyAction {
    /// Build from a raw event value. Anything outside 0..=2 is not a key
    /// transition and yields None.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyAction::Release),
            1 => Some(KeyAction::Press),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }

    /// Press or autorepeat: the transitions the engine decides on.
    pub fn is_down(self) -> bool {
        matches!(self, KeyAction::Press | KeyAction::Repeat)
    }

    pub fn is_release(self) -> bool {
        matches!(self, KeyAction::Release)
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Release => write!(f, "release"),
            KeyAction::Press => write!(f, "press"),
            KeyAction::Repeat => write!(f, "repeat"),
        }
    }
}
