// Glyphkeys Core Library
// System-wide keyboard interception: grab the keyboards, decide each
// keystroke, and replace characters through user-defined glyph fonts.

pub mod action;
pub mod caps;
pub mod capture;
pub mod engine;
pub mod font;
pub mod hook;
pub mod input;
pub mod key;
pub mod mode;
pub mod observer;
pub mod output;
pub mod probe;
pub mod settings;

pub use action::KeyAction;
pub use caps::{case_filtered, CapsState};
pub use capture::{CaptureError, DeviceCapture, DeviceInfo};
pub use engine::{EngineAction, EngineContext, InterceptionEngine};
pub use font::{FontError, FontStore, GlyphEntry, GlyphFont};
pub use hook::discovery::{DiscoveredKey, DISCOVERY_CHARSET};
pub use hook::{
    Disposition, EventOrigin, HookError, HookManager, KeySink, PollOutcome, RawKeyEvent,
    SelfEchoGuard,
};
pub use input::{is_own_virtual, looks_like_keyboard, matches_device_filter, VIRTUAL_DEVICE_PREFIX};
pub use key::{char_to_key, is_standard_key, key_from_name, key_to_char, KeyCode};
pub use mode::KeyboardMode;
pub use observer::{InterceptObserver, NullObserver, Severity};
pub use output::UinputSink;
pub use probe::ModifierProbe;
pub use settings::{Settings, SettingsError};
