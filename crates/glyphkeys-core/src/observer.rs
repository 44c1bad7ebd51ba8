// Glyphkeys Intercept Observer
// Notification seam between the engine and whatever is watching it.

use crate::key::KeyCode;
use crate::mode::KeyboardMode;

/// How bad a hook-level failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Receives engine notifications.
///
/// All methods default to no-ops so an implementor only picks up the
/// notifications it cares about. Fired from the hook thread; keep
/// implementations short.
pub trait InterceptObserver: Send {
    /// A key press was swallowed.
    fn on_key_blocked(&mut self, _key: KeyCode) {}

    /// A key press passed through untouched.
    fn on_key_forwarded(&mut self, _key: KeyCode) {}

    /// A key press was swallowed and `replacement` synthesized instead.
    fn on_key_intercepted(&mut self, _key: KeyCode, _replacement: &str) {}

    /// The engine switched itself from `from` to `to` (no font loaded).
    fn on_mode_autoswitch(&mut self, _from: KeyboardMode, _to: KeyboardMode) {}

    /// Registration or synthesis trouble.
    fn on_hook_failure(&mut self, _severity: Severity, _message: &str) {}
}

/// Observer that drops every notification.
#[derive(Debug, Default, Clone)]
pub struct NullObserver;

impl InterceptObserver for NullObserver {}
