// Glyphkeys Modifier Probe
// Tracks physical modifier and lock state from the event stream itself.

use crate::action::KeyAction;
use crate::key::KeyCode;
use smallvec::SmallVec;

/// Modifier and lock state as seen by the hook.
///
/// Fed every key transition, including releases and loopback echoes, so
/// the intercept decision reads the same state the rest of the system
/// does. CapsLock is latched per press; the key being physically held is
/// tracked separately and never affects the lock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModifierProbe {
    left_ctrl: bool,
    right_ctrl: bool,
    left_alt: bool,
    right_alt: bool,
    left_shift: bool,
    right_shift: bool,
    caps_held: bool,
    caps_latched: bool,
    right_ctrl_latched: bool,
}

impl ModifierProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one key transition. Repeats are ignored: autorepeat of a
    /// modifier does not change its held state.
    pub fn observe(&mut self, key: KeyCode, action: KeyAction) {
        let down = match action {
            KeyAction::Press => true,
            KeyAction::Release => false,
            KeyAction::Repeat => return,
        };
        match key {
            KeyCode::LEFT_CTRL => self.left_ctrl = down,
            KeyCode::RIGHT_CTRL => {
                self.right_ctrl = down;
                if down {
                    self.right_ctrl_latched = !self.right_ctrl_latched;
                }
            }
            KeyCode::LEFT_ALT => self.left_alt = down,
            KeyCode::RIGHT_ALT => self.right_alt = down,
            KeyCode::LEFT_SHIFT => self.left_shift = down,
            KeyCode::RIGHT_SHIFT => self.right_shift = down,
            KeyCode::CAPS_LOCK => {
                self.caps_held = down;
                if down {
                    self.caps_latched = !self.caps_latched;
                }
            }
            _ => {}
        }
    }

    /// Whether a bypass modifier is active. Interception is skipped while
    /// one is, so shortcuts like Ctrl+C keep working in every mode that
    /// forwards. Right Ctrl participates through its latch, not its held
    /// state; Shift is deliberately not part of the gate.
    pub fn bypass_active(&self) -> bool {
        self.left_ctrl || self.right_ctrl_latched || self.left_alt || self.right_alt
    }

    pub fn shift_down(&self) -> bool {
        self.left_shift || self.right_shift
    }

    pub fn caps_lock_on(&self) -> bool {
        self.caps_latched
    }

    /// Currently held tracked keys, for diagnostics.
    pub fn held_keys(&self) -> SmallVec<[KeyCode; 4]> {
        let mut held = SmallVec::new();
        if self.left_ctrl {
            held.push(KeyCode::LEFT_CTRL);
        }
        if self.right_ctrl {
            held.push(KeyCode::RIGHT_CTRL);
        }
        if self.left_alt {
            held.push(KeyCode::LEFT_ALT);
        }
        if self.right_alt {
            held.push(KeyCode::RIGHT_ALT);
        }
        if self.left_shift {
            held.push(KeyCode::LEFT_SHIFT);
        }
        if self.right_shift {
            held.push(KeyCode::RIGHT_SHIFT);
        }
        if self.caps_held {
            held.push(KeyCode::CAPS_LOCK);
        }
        held
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
