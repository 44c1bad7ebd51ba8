// Glyphkeys Input Device Classification
// Decides which /dev/input devices belong in the grab set.

use evdev::{Device, EventType, Key};

/// Name prefix of our own virtual output device. Anything carrying it is
/// never grabbed; grabbing it would swallow the engine's own output.
pub const VIRTUAL_DEVICE_PREFIX: &str = "Glyphkeys (virtual)";

/// Top letter row on a QWERTY board.
const QWERTY_ROW: [u16; 6] = [16, 17, 18, 19, 20, 21];

/// A, Z and space: present on anything that can type text.
const LETTER_SPACE: [u16; 3] = [30, 44, 57];

pub fn is_own_virtual(name: &str) -> bool {
    name.contains(VIRTUAL_DEVICE_PREFIX)
}

/// Heuristic keyboard check: reports key events, is not our virtual
/// device, and advertises the full QWERTY row plus letters and space.
/// Filters out power buttons, headsets, and other devices that technically
/// report a key or two.
pub fn looks_like_keyboard(device: &Device) -> bool {
    if !device.supported_events().contains(EventType::KEY) {
        return false;
    }
    if is_own_virtual(device.name().unwrap_or("")) {
        return false;
    }
    let Some(keys) = device.supported_keys() else {
        return false;
    };
    QWERTY_ROW
        .iter()
        .chain(LETTER_SPACE.iter())
        .all(|code| keys.contains(Key::new(*code)))
}

/// Whether a device belongs in the grab set.
///
/// An empty filter means auto-detect: take everything that looks like a
/// keyboard. An explicit filter matches by exact device name or node path
/// and still refuses our own virtual device.
pub fn matches_device_filter(name: &str, path: &str, filter: &[String], is_keyboard: bool) -> bool {
    if is_own_virtual(name) {
        return false;
    }
    if filter.is_empty() {
        return is_keyboard;
    }
    filter.iter().any(|wanted| wanted == name || wanted == path)
}
