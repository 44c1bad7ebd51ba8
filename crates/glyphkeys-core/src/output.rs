// Glyphkeys Output
// Virtual uinput device for forwarding and synthesis, plus the loopback
// tap that reads our own output back.

use crate::hook::{EventOrigin, HookError, KeySink, RawKeyEvent, EV_KEY};
use crate::key::{char_to_key, KeyCode};
use evdev::uinput::VirtualDevice;
use evdev::{Device, EventType, InputEvent};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

/// Modifier codes tracked for release/restore around synthesis. CapsLock
/// is deliberately absent: re-pressing it would toggle the lock.
const TRACKED_MODIFIERS: [u16; 8] = [29, 42, 54, 56, 97, 100, 125, 126];

/// The production key sink.
///
/// Writes go to a uinput virtual device. The same device is reopened
/// read-only as the "tap": every event we write comes back through it,
/// which is how synthesis observes its own echoes. The tap is never
/// grabbed; echoes must still reach the compositor, we only watch.
pub struct UinputSink {
    device: VirtualDevice,
    tap: Device,
    echo_timeout: Duration,
    pacing: Duration,
    held_modifiers: Vec<u16>,
    pressed_keys: Vec<u16>,
}

impl UinputSink {
    pub const DEVICE_NAME: &'static str = "Glyphkeys (virtual) Keyboard";

    /// Create the virtual device and open its tap. `echo_timeout_ms`
    /// bounds how long one injected character may take to echo back.
    pub fn new(echo_timeout_ms: u64) -> Result<Self, HookError> {
        use evdev::uinput::VirtualDeviceBuilder;
        use evdev::AttributeSet;

        let mut keys = AttributeSet::new();
        for code in 0..256u16 {
            keys.insert(evdev::Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(|e: std::io::Error| HookError::Output(e.to_string()))?
            .name(Self::DEVICE_NAME)
            .with_keys(&keys)
            .map_err(|e: std::io::Error| HookError::Output(e.to_string()))?
            .build()
            .map_err(|e: std::io::Error| HookError::Output(e.to_string()))?;

        let tap = Self::open_tap()?;

        Ok(Self {
            device,
            tap,
            echo_timeout: Duration::from_millis(echo_timeout_ms),
            pacing: Duration::from_millis(1),
            held_modifiers: Vec::new(),
            pressed_keys: Vec::new(),
        })
    }

    /// Reopen our own virtual device by name. The node can take a moment
    /// to appear under /dev/input after creation, so retry briefly.
    fn open_tap() -> Result<Device, HookError> {
        for _ in 0..20 {
            for (_, device) in evdev::enumerate() {
                if device.name() == Some(Self::DEVICE_NAME) {
                    return Ok(device);
                }
            }
            thread::sleep(Duration::from_millis(25));
        }
        Err(HookError::Output(
            "loopback tap for the virtual device never appeared".to_string(),
        ))
    }

    fn emit(&mut self, code: u16, value: i32) -> Result<(), HookError> {
        let key_event = InputEvent::new(EventType::KEY, code, value);
        // SYN is required for the kernel to flush the key event
        let syn_event = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        self.device
            .emit(&[key_event, syn_event])
            .map_err(|e: std::io::Error| HookError::Injection(e.to_string()))
    }

    /// Emit press+release. Returns the number of key events written.
    fn tap_key(&mut self, code: u16) -> Result<usize, HookError> {
        self.emit(code, 1)?;
        self.emit(code, 0)?;
        Ok(2)
    }

    /// Emit one character by direct key events, or via the compose
    /// sequence for anything outside the ASCII table. Returns the number
    /// of key events written.
    fn send_char(&mut self, ch: char) -> Result<usize, HookError> {
        match ascii_key_and_shift(ch) {
            Some((code, true)) => {
                self.emit(KeyCode::LEFT_SHIFT.code(), 1)?;
                self.tap_key(code)?;
                self.emit(KeyCode::LEFT_SHIFT.code(), 0)?;
                Ok(4)
            }
            Some((code, false)) => self.tap_key(code),
            None => self.send_unicode(ch),
        }
    }

    /// Ctrl+Shift+U compose entry, understood by the usual Linux input
    /// methods. Returns the number of key events written.
    fn send_unicode(&mut self, ch: char) -> Result<usize, HookError> {
        let hex = format!("{:x}", ch as u32);
        let mut written = 0;

        self.emit(KeyCode::LEFT_CTRL.code(), 1)?;
        self.emit(KeyCode::LEFT_SHIFT.code(), 1)?;
        written += 2;
        written += self.tap_key(22)?; // U
        self.emit(KeyCode::LEFT_SHIFT.code(), 0)?;
        self.emit(KeyCode::LEFT_CTRL.code(), 0)?;
        written += 2;

        for digit in hex.chars() {
            let code = hex_digit_code(digit).ok_or_else(|| {
                HookError::Injection(format!("no key for hex digit {:?}", digit))
            })?;
            written += self.tap_key(code)?;
        }
        written += self.tap_key(KeyCode::ENTER.code())?;
        Ok(written)
    }

    /// Collect our own echoes from the tap: `expected` key events or the
    /// per-character timeout, whichever comes first.
    fn drain_echoes(&mut self, expected: usize) -> Vec<RawKeyEvent> {
        let mut echoes = Vec::with_capacity(expected);
        let deadline = Instant::now() + self.echo_timeout;
        while echoes.len() < expected {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = (deadline - now).as_millis() as i32;
            let mut fds = [libc::pollfd {
                fd: self.tap.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, remaining.max(1)) };
            if ready < 0 {
                if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                break;
            }
            if ready == 0 {
                break;
            }
            let Ok(fetched) = self.tap.fetch_events() else {
                break;
            };
            for event in fetched {
                if event.event_type() == EventType::KEY {
                    echoes.push(RawKeyEvent::new(
                        EV_KEY,
                        event.code(),
                        event.value(),
                        EventOrigin::Loopback,
                    ));
                }
            }
        }
        echoes
    }

    fn inject_chars(&mut self, text: &str, echoes: &mut Vec<RawKeyEvent>) -> Result<(), HookError> {
        for ch in text.chars() {
            let written = self.send_char(ch)?;
            echoes.extend(self.drain_echoes(written));
            thread::sleep(self.pacing);
        }
        Ok(())
    }

    fn track_forwarded(&mut self, code: u16, value: i32) {
        let list = if TRACKED_MODIFIERS.contains(&code) {
            &mut self.held_modifiers
        } else {
            &mut self.pressed_keys
        };
        match value {
            1 => {
                if !list.contains(&code) {
                    list.push(code);
                }
            }
            0 => list.retain(|c| *c != code),
            _ => {}
        }
    }
}

impl KeySink for UinputSink {
    fn forward(&mut self, event: &RawKeyEvent) -> Result<(), HookError> {
        match event.origin {
            EventOrigin::Physical => {
                if !event.is_key() {
                    return Ok(());
                }
                self.emit(event.code, event.value)?;
                self.track_forwarded(event.code, event.value);
                Ok(())
            }
            // Already written by us and on its way to the OS. Emitting it
            // again would produce a fresh echo of the echo.
            EventOrigin::Loopback => Ok(()),
        }
    }

    fn inject_text(&mut self, text: &str) -> Result<Vec<RawKeyEvent>, HookError> {
        let mut echoes = Vec::new();

        // Park held modifiers so a physically held Shift or Ctrl cannot
        // distort the synthetic keys, then put them back. The parking
        // events echo too and are drained like everything else.
        let held = self.held_modifiers.clone();
        for code in held.iter().rev() {
            self.emit(*code, 0)?;
            echoes.extend(self.drain_echoes(1));
        }

        let injected = self.inject_chars(text, &mut echoes);

        let mut restore_error = None;
        for code in held.iter() {
            match self.emit(*code, 1) {
                Ok(()) => echoes.extend(self.drain_echoes(1)),
                Err(err) => {
                    restore_error = Some(err);
                    break;
                }
            }
        }

        match (injected, restore_error) {
            (Err(err), _) => Err(err),
            (Ok(()), Some(err)) => Err(err),
            (Ok(()), None) => Ok(echoes),
        }
    }

    fn alert(&mut self) {
        // terminal bell; harmless no-op when stdout is not a tty
        let mut out = std::io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }

    fn flush_echoes(&mut self) {
        loop {
            let mut fds = [libc::pollfd {
                fd: self.tap.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
            if ready <= 0 {
                return;
            }
            if self.tap.fetch_events().is_err() {
                return;
            }
        }
    }

    fn release_held(&mut self) {
        let keys: Vec<u16> = self.pressed_keys.drain(..).collect();
        let modifiers: Vec<u16> = self.held_modifiers.drain(..).rev().collect();
        for code in keys.into_iter().chain(modifiers) {
            if let Err(err) = self.emit(code, 0) {
                log::warn!("release of {} failed: {}", KeyCode::new(code), err);
            }
        }
    }
}

/// Key code and shift flag for one ASCII character.
fn ascii_key_and_shift(ch: char) -> Option<(u16, bool)> {
    if ch.is_ascii_uppercase() {
        return char_to_key(ch).map(|key| (key.code(), true));
    }
    if let Some(key) = char_to_key(ch) {
        return Some((key.code(), false));
    }
    let (code, shift) = match ch {
        '\n' => (28, false),
        '\t' => (15, false),
        '-' => (12, false),
        '_' => (12, true),
        '=' => (13, false),
        '+' => (13, true),
        '[' => (26, false),
        '{' => (26, true),
        ']' => (27, false),
        '}' => (27, true),
        ';' => (39, false),
        ':' => (39, true),
        '\'' => (40, false),
        '"' => (40, true),
        '`' => (41, false),
        '~' => (41, true),
        '\\' => (43, false),
        '|' => (43, true),
        ',' => (51, false),
        '<' => (51, true),
        '.' => (52, false),
        '>' => (52, true),
        '/' => (53, false),
        '?' => (53, true),
        '!' => (2, true),
        '@' => (3, true),
        '#' => (4, true),
        '$' => (5, true),
        '%' => (6, true),
        '^' => (7, true),
        '&' => (8, true),
        '*' => (9, true),
        '(' => (10, true),
        ')' => (11, true),
        _ => return None,
    };
    Some((code, shift))
}

/// Key code for one lowercase hex digit.
fn hex_digit_code(digit: char) -> Option<u16> {
    char_to_key(digit).map(|key| key.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_table_standard_chars() {
        assert_eq!(ascii_key_and_shift('a'), Some((30, false)));
        assert_eq!(ascii_key_and_shift('A'), Some((30, true)));
        assert_eq!(ascii_key_and_shift('0'), Some((11, false)));
        assert_eq!(ascii_key_and_shift(' '), Some((57, false)));
    }

    #[test]
    fn test_ascii_table_punctuation() {
        assert_eq!(ascii_key_and_shift('-'), Some((12, false)));
        assert_eq!(ascii_key_and_shift('_'), Some((12, true)));
        assert_eq!(ascii_key_and_shift('@'), Some((3, true)));
        assert_eq!(ascii_key_and_shift(')'), Some((11, true)));
        assert_eq!(ascii_key_and_shift('\n'), Some((28, false)));
    }

    #[test]
    fn test_non_ascii_goes_to_compose() {
        assert_eq!(ascii_key_and_shift('α'), None);
        assert_eq!(ascii_key_and_shift('𝔞'), None);
    }

    #[test]
    fn test_hex_digit_codes() {
        assert_eq!(hex_digit_code('0'), Some(11));
        assert_eq!(hex_digit_code('9'), Some(10));
        assert_eq!(hex_digit_code('a'), Some(30));
        assert_eq!(hex_digit_code('f'), Some(33));
        assert_eq!(hex_digit_code('g'), Some(34)); // still a key, harmless
    }

    #[test]
    fn test_sink_creation_without_uinput() {
        // On hosts without /dev/uinput access this must fail cleanly, not
        // panic. With access it must come up with a working tap.
        match UinputSink::new(25) {
            Ok(sink) => drop(sink),
            Err(HookError::Output(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
}
