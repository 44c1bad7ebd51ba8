// Glyphkeys Key-Code Discovery
// Learns the code-to-character table empirically: inject each character,
// watch which key code the Disabled engine blocks on the way back.

use super::HookManager;
use crate::hook::HookError;
use crate::key::{key_to_char, KeyCode};
use crate::mode::KeyboardMode;
use crate::observer::InterceptObserver;
use parking_lot::Mutex;
use std::sync::Arc;

/// The canonical probe set: digits, uppercase, lowercase, space last.
pub const DISCOVERY_CHARSET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz ";

/// One confirmed observation: this key code produced this character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredKey {
    pub code: KeyCode,
    pub ch: char,
}

#[derive(Default)]
struct RecorderState {
    expecting: Option<char>,
    hits: Vec<DiscoveredKey>,
}

/// Observer spliced in during discovery. Watches blocked keys for the one
/// matching the character currently in flight.
struct KeycodeRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl InterceptObserver for KeycodeRecorder {
    fn on_key_blocked(&mut self, key: KeyCode) {
        let mut state = self.state.lock();
        let Some(expected) = state.expecting else {
            return;
        };
        // Compare on the decoded base character, case folded: the code is
        // what we are trying to learn, and Shift halves of an uppercase
        // echo decode to None and fall through. Clearing `expecting` on
        // the first match means a double fire or a stray physical key can
        // record at most once per character.
        if key_to_char(key) == Some(expected.to_ascii_lowercase()) {
            state.hits.push(DiscoveredKey { code: key, ch: expected });
            state.expecting = None;
        }
    }
}

impl HookManager {
    /// Build the code-to-character table for `charset`.
    ///
    /// Runs with the engine forced to Disabled so nothing leaks to the OS,
    /// and with a recording observer spliced in. Each character is
    /// injected unguarded, so its echo takes the normal decision path and
    /// gets blocked where the recorder can see it. Serial by construction:
    /// one character's round trip finishes (or times out) before the next
    /// starts. Mode and observer are restored on every path out.
    pub fn discover_keycodes(&mut self, charset: &str) -> Result<Vec<DiscoveredKey>, HookError> {
        let prior_mode = self.engine.context().mode();
        self.engine.context().set_mode(KeyboardMode::Disabled);
        let state = Arc::new(Mutex::new(RecorderState::default()));
        let prior_observer = self.engine.swap_observer(Box::new(KeycodeRecorder {
            state: Arc::clone(&state),
        }));

        let result = self.probe_charset(charset, &state);

        let _ = self.engine.swap_observer(prior_observer);
        self.engine.context().set_mode(prior_mode);

        result.map(|()| {
            let hits = std::mem::take(&mut state.lock().hits);
            log::info!("discovery confirmed {} of {} characters", hits.len(), charset.chars().count());
            hits
        })
    }

    fn probe_charset(
        &mut self,
        charset: &str,
        state: &Arc<Mutex<RecorderState>>,
    ) -> Result<(), HookError> {
        self.sink.flush_echoes();
        let mut buf = [0u8; 4];
        for ch in charset.chars() {
            state.lock().expecting = Some(ch);
            // Unguarded on purpose: the echo must reach the engine and be
            // blocked for the recorder to see its code.
            let echoes = self.sink.inject_text(ch.encode_utf8(&mut buf))?;
            for echo in echoes {
                self.handle_event(echo);
            }
            if state.lock().expecting.take().is_some() {
                log::warn!("no key code observed for {:?}, skipping", ch);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineContext, InterceptionEngine};
    use crate::hook::{KeySink, RawKeyEvent};
    use crate::key::char_to_key;

    /// Sink whose echoes can be scripted per character.
    struct ScriptedSink {
        injected: Arc<Mutex<Vec<String>>>,
        script: EchoScript,
    }

    #[derive(Clone, Copy)]
    enum EchoScript {
        /// Echo the right key, with shift halves for uppercase.
        Faithful,
        /// Echo nothing at all (timeout path).
        Silent,
        /// Echo a fixed wrong key code for every character.
        WrongCode(u16),
        /// Echo the right key twice.
        DoubleFire,
    }

    impl KeySink for ScriptedSink {
        fn forward(&mut self, _event: &RawKeyEvent) -> Result<(), HookError> {
            Ok(())
        }

        fn inject_text(&mut self, text: &str) -> Result<Vec<RawKeyEvent>, HookError> {
            self.injected.lock().push(text.to_string());
            let mut echoes = Vec::new();
            for ch in text.chars() {
                match self.script {
                    EchoScript::Silent => {}
                    EchoScript::WrongCode(code) => {
                        echoes.push(RawKeyEvent::key_press(KeyCode::new(code)).as_loopback());
                        echoes.push(RawKeyEvent::key_release(KeyCode::new(code)).as_loopback());
                    }
                    EchoScript::Faithful | EchoScript::DoubleFire => {
                        let Some(key) = char_to_key(ch) else { continue };
                        let reps = match self.script {
                            EchoScript::DoubleFire => 2,
                            _ => 1,
                        };
                        for _ in 0..reps {
                            if ch.is_ascii_uppercase() {
                                echoes.push(
                                    RawKeyEvent::key_press(KeyCode::LEFT_SHIFT).as_loopback(),
                                );
                            }
                            echoes.push(RawKeyEvent::key_press(key).as_loopback());
                            echoes.push(RawKeyEvent::key_release(key).as_loopback());
                            if ch.is_ascii_uppercase() {
                                echoes.push(
                                    RawKeyEvent::key_release(KeyCode::LEFT_SHIFT).as_loopback(),
                                );
                            }
                        }
                    }
                }
            }
            Ok(echoes)
        }

        fn alert(&mut self) {}
    }

    fn manager_with(script: EchoScript, mode: KeyboardMode) -> HookManager {
        let ctx = Arc::new(EngineContext::new(mode, false));
        let engine = InterceptionEngine::new(ctx);
        let sink = ScriptedSink {
            injected: Arc::new(Mutex::new(Vec::new())),
            script,
        };
        HookManager::new(engine, Box::new(sink))
    }

    #[test]
    fn test_full_charset_discovery() {
        let mut manager = manager_with(EchoScript::Faithful, KeyboardMode::Intercept);
        let discovered = manager.discover_keycodes(DISCOVERY_CHARSET).unwrap();
        // every charset character decodes through the standard table
        assert_eq!(discovered.len(), DISCOVERY_CHARSET.chars().count());
        let a = discovered.iter().find(|d| d.ch == 'a').unwrap();
        assert_eq!(a.code, KeyCode::new(30));
        let upper_a = discovered.iter().find(|d| d.ch == 'A').unwrap();
        assert_eq!(upper_a.code, KeyCode::new(30));
        let space = discovered.iter().find(|d| d.ch == ' ').unwrap();
        assert_eq!(space.code, KeyCode::SPACE);
        // prior mode restored
        assert_eq!(manager.engine().context().mode(), KeyboardMode::Intercept);
    }

    #[test]
    fn test_silent_characters_skipped() {
        let mut manager = manager_with(EchoScript::Silent, KeyboardMode::Enabled);
        let discovered = manager.discover_keycodes("abc").unwrap();
        assert!(discovered.is_empty());
        assert_eq!(manager.engine().context().mode(), KeyboardMode::Enabled);
    }

    #[test]
    fn test_mismatched_echo_discarded() {
        // echoes always claim code 30 ('a'); only the literal 'a' matches
        let mut manager = manager_with(EchoScript::WrongCode(30), KeyboardMode::Enabled);
        let discovered = manager.discover_keycodes("xya").unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(
            discovered[0],
            DiscoveredKey {
                code: KeyCode::new(30),
                ch: 'a'
            }
        );
    }

    #[test]
    fn test_double_fire_records_once() {
        let mut manager = manager_with(EchoScript::DoubleFire, KeyboardMode::Enabled);
        let discovered = manager.discover_keycodes("ab").unwrap();
        assert_eq!(discovered.len(), 2);
        assert_eq!(discovered[0].ch, 'a');
        assert_eq!(discovered[1].ch, 'b');
    }

    #[test]
    fn test_observer_restored_after_discovery() {
        use crate::observer::InterceptObserver;

        struct Flag {
            hits: Arc<Mutex<usize>>,
        }
        impl InterceptObserver for Flag {
            fn on_key_forwarded(&mut self, _key: KeyCode) {
                *self.hits.lock() += 1;
            }
        }

        let hits = Arc::new(Mutex::new(0));
        let ctx = Arc::new(EngineContext::new(KeyboardMode::Enabled, false));
        let engine = InterceptionEngine::with_observer(
            ctx,
            Box::new(Flag {
                hits: Arc::clone(&hits),
            }),
        );
        let sink = ScriptedSink {
            injected: Arc::new(Mutex::new(Vec::new())),
            script: EchoScript::Faithful,
        };
        let mut manager = HookManager::new(engine, Box::new(sink));

        manager.discover_keycodes("ab").unwrap();
        assert_eq!(*hits.lock(), 0);

        // original observer is back in place after discovery
        manager.handle_event(RawKeyEvent::key_press(KeyCode::new(30)));
        assert_eq!(*hits.lock(), 1);
    }
}
