// Glyphkeys Re-entry and Discovery Scenarios
//
// Everything the hook synthesizes comes back through the loopback tap as
// an echo, so the two things that can go catastrophically wrong are a
// feedback loop (the hook re-deciding its own output) and a discovery run
// that leaves the engine in the wrong mode. These tests script both.
//
// Run with: cargo test --test reentry_and_discovery

use std::sync::Arc;

use parking_lot::Mutex;

use glyphkeys_core::{
    char_to_key, DiscoveredKey, Disposition, EngineContext, EventOrigin, GlyphFont, HookError,
    HookManager, InterceptObserver, InterceptionEngine, KeyCode, KeySink, KeyboardMode,
    RawKeyEvent, DISCOVERY_CHARSET,
};

// =========================================================================
// Test Helpers
// =========================================================================

#[derive(Clone, Copy, Default)]
enum EchoStyle {
    /// Echo the right key pair, shift-wrapped for uppercase, a compose
    /// sequence for anything without a direct key.
    #[default]
    Faithful,
    /// Swallow every injection silently (dead virtual device).
    Silent,
    /// Echo a fixed wrong key code for every character.
    WrongCode(u16),
    /// Echo the right key twice per character.
    DoubleFire,
}

#[derive(Default)]
struct SinkState {
    forwarded: Vec<RawKeyEvent>,
    injected: Vec<String>,
    flushes: usize,
    fail_injection: bool,
    echo: EchoStyle,
}

#[derive(Default)]
struct ScriptedSink {
    state: Arc<Mutex<SinkState>>,
}

fn faithful_echoes(text: &str, echoes: &mut Vec<RawKeyEvent>) {
    for ch in text.chars() {
        match char_to_key(ch) {
            Some(key) => {
                if ch.is_ascii_uppercase() {
                    echoes.push(RawKeyEvent::key_press(KeyCode::LEFT_SHIFT).as_loopback());
                }
                echoes.push(RawKeyEvent::key_press(key).as_loopback());
                echoes.push(RawKeyEvent::key_release(key).as_loopback());
                if ch.is_ascii_uppercase() {
                    echoes.push(RawKeyEvent::key_release(KeyCode::LEFT_SHIFT).as_loopback());
                }
            }
            None => {
                // Ctrl+Shift+U compose, abbreviated to its modifier shape
                echoes.push(RawKeyEvent::key_press(KeyCode::LEFT_CTRL).as_loopback());
                echoes.push(RawKeyEvent::key_press(KeyCode::LEFT_SHIFT).as_loopback());
                echoes.push(RawKeyEvent::key_press(KeyCode::new(22)).as_loopback());
                echoes.push(RawKeyEvent::key_release(KeyCode::new(22)).as_loopback());
                echoes.push(RawKeyEvent::key_release(KeyCode::LEFT_SHIFT).as_loopback());
                echoes.push(RawKeyEvent::key_release(KeyCode::LEFT_CTRL).as_loopback());
            }
        }
    }
}

fn fabricate(text: &str, style: EchoStyle) -> Vec<RawKeyEvent> {
    let mut echoes = Vec::new();
    match style {
        EchoStyle::Silent => {}
        EchoStyle::Faithful => faithful_echoes(text, &mut echoes),
        EchoStyle::DoubleFire => {
            faithful_echoes(text, &mut echoes);
            faithful_echoes(text, &mut echoes);
        }
        EchoStyle::WrongCode(code) => {
            for _ in text.chars() {
                echoes.push(RawKeyEvent::key_press(KeyCode::new(code)).as_loopback());
                echoes.push(RawKeyEvent::key_release(KeyCode::new(code)).as_loopback());
            }
        }
    }
    echoes
}

impl KeySink for ScriptedSink {
    fn forward(&mut self, event: &RawKeyEvent) -> Result<(), HookError> {
        self.state.lock().forwarded.push(*event);
        Ok(())
    }

    fn inject_text(&mut self, text: &str) -> Result<Vec<RawKeyEvent>, HookError> {
        let mut state = self.state.lock();
        if state.fail_injection {
            return Err(HookError::Injection("scripted failure".to_string()));
        }
        state.injected.push(text.to_string());
        let style = state.echo;
        drop(state);
        Ok(fabricate(text, style))
    }

    fn alert(&mut self) {}

    fn flush_echoes(&mut self) {
        self.state.lock().flushes += 1;
    }
}

fn harness(mode: KeyboardMode) -> (HookManager, Arc<Mutex<SinkState>>) {
    let sink = ScriptedSink::default();
    let state = Arc::clone(&sink.state);
    let ctx = Arc::new(EngineContext::new(mode, false));
    let engine = InterceptionEngine::new(ctx);
    (HookManager::new(engine, Box::new(sink)), state)
}

fn font(entries: &[(char, &str)]) -> Arc<GlyphFont> {
    let mut font = GlyphFont::new("scripted");
    for (source, target) in entries {
        font.insert(*source, *target).unwrap();
    }
    Arc::new(font)
}

fn tap(hook: &mut HookManager, key: KeyCode) -> Disposition {
    let disposition = hook.handle_event(RawKeyEvent::key_press(key));
    hook.handle_event(RawKeyEvent::key_release(key));
    disposition
}

// =========================================================================
// Scenario 1: The self-echo guard
// =========================================================================

#[test]
fn e2e_identity_font_does_not_feed_back() {
    // Scenario: a font entry maps a key to the very character that key
    // produces; without the guard this is an infinite loop
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "a")])));
    let key_a = char_to_key('a').unwrap();

    for _ in 0..3 {
        assert_eq!(tap(&mut hook, key_a), Disposition::Replaced);
        assert!(!hook.guard_engaged());
    }

    let state = state.lock();
    assert_eq!(state.injected, vec!["a", "a", "a"]);
    // each tap forwarded one physical release and two loopback echoes
    let physical: Vec<_> = state
        .forwarded
        .iter()
        .filter(|e| e.origin == EventOrigin::Physical)
        .collect();
    assert_eq!(physical.len(), 3);
    assert!(physical.iter().all(|e| e.value == 0));
    let loopback = state
        .forwarded
        .iter()
        .filter(|e| e.origin == EventOrigin::Loopback)
        .count();
    assert_eq!(loopback, 6);
}

#[test]
fn e2e_replacement_echo_modifiers_leave_probe_neutral() {
    // Scenario: a shifted echo presses Shift on the way through; the
    // probe must see both halves and come back to rest
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "Xy")])));
    let key_a = char_to_key('a').unwrap();

    tap(&mut hook, key_a);
    assert!(!hook.probe().shift_down());

    // and the next keystroke still resolves as unshifted
    tap(&mut hook, key_a);
    assert_eq!(state.lock().injected, vec!["Xy", "Xy"]);
}

#[test]
fn e2e_unicode_replacement_echoes_are_routed() {
    // Scenario: glyphs outside the key table echo back as a compose
    // sequence full of Ctrl and Shift transitions
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "α")])));
    let key_a = char_to_key('a').unwrap();

    assert_eq!(tap(&mut hook, key_a), Disposition::Replaced);
    assert!(!hook.probe().shift_down());
    assert!(!hook.probe().bypass_active());

    // the transient Ctrl in the echo did not latch a bypass
    assert_eq!(tap(&mut hook, key_a), Disposition::Replaced);
    assert_eq!(state.lock().injected, vec!["α", "α"]);
}

#[test]
fn e2e_failed_injection_drops_key_and_recovers() {
    // Scenario: the virtual device write fails mid-session; the key is
    // lost but the hook keeps running and the guard is free
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "α")])));
    let key_a = char_to_key('a').unwrap();

    state.lock().fail_injection = true;
    assert_eq!(tap(&mut hook, key_a), Disposition::Replaced);
    assert!(!hook.guard_engaged());
    assert!(state.lock().injected.is_empty());

    state.lock().fail_injection = false;
    assert_eq!(tap(&mut hook, key_a), Disposition::Replaced);
    assert_eq!(state.lock().injected, vec!["α"]);
}

#[test]
fn e2e_stale_echoes_flushed_before_each_synthesis() {
    // Scenario: every synthesis starts from a drained tap
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "x")])));
    let key_a = char_to_key('a').unwrap();

    tap(&mut hook, key_a);
    tap(&mut hook, key_a);

    assert_eq!(state.lock().flushes, 2);
}

#[test]
fn e2e_physical_keys_still_decided_between_syntheses() {
    // Scenario: interleaved replaceable and pass-through keys; the guard
    // never bleeds from one into the next
    let (mut hook, state) = harness(KeyboardMode::Intercept);
    hook.engine().context().set_font(Some(font(&[('a', "α"), ('b', "β")])));

    assert_eq!(tap(&mut hook, char_to_key('a').unwrap()), Disposition::Replaced);
    assert_eq!(tap(&mut hook, KeyCode::ESC), Disposition::Forwarded);
    assert_eq!(tap(&mut hook, char_to_key('b').unwrap()), Disposition::Replaced);

    assert_eq!(state.lock().injected, vec!["α", "β"]);
}

// =========================================================================
// Scenario 2: Key-code discovery
// =========================================================================

#[test]
fn e2e_discovery_learns_the_full_charset() {
    // Scenario: a healthy round trip confirms every probe character
    let (mut hook, state) = harness(KeyboardMode::Intercept);

    let discovered = hook.discover_keycodes(DISCOVERY_CHARSET).unwrap();

    assert_eq!(discovered.len(), DISCOVERY_CHARSET.chars().count());
    assert_eq!(state.lock().injected.len(), DISCOVERY_CHARSET.chars().count());

    let lookup = |ch: char| -> KeyCode {
        discovered.iter().find(|d| d.ch == ch).unwrap().code
    };
    assert_eq!(lookup('a'), KeyCode::new(30));
    assert_eq!(lookup('A'), KeyCode::new(30)); // same key, shift decides
    assert_eq!(lookup('0'), KeyCode::new(11));
    assert_eq!(lookup('z'), KeyCode::new(44));
    assert_eq!(lookup(' '), KeyCode::SPACE);

    // the interrupted mode came back
    assert_eq!(hook.engine().context().mode(), KeyboardMode::Intercept);
}

#[test]
fn e2e_discovery_blocks_probes_from_the_os() {
    // Scenario: while discovery runs the engine is disabled, so probe
    // presses die in the hook and only releases flow out
    let (mut hook, state) = harness(KeyboardMode::Enabled);

    hook.discover_keycodes("aB").unwrap();

    let state = state.lock();
    assert!(!state.forwarded.is_empty());
    assert!(state.forwarded.iter().all(|e| e.value == 0));
}

#[test]
fn e2e_discovery_handles_dead_virtual_device() {
    // Scenario: nothing ever echoes back; every character times out and
    // the run still completes cleanly
    let (mut hook, state) = harness(KeyboardMode::Enabled);
    state.lock().echo = EchoStyle::Silent;

    let discovered = hook.discover_keycodes("abc").unwrap();

    assert!(discovered.is_empty());
    assert_eq!(hook.engine().context().mode(), KeyboardMode::Enabled);
}

#[test]
fn e2e_discovery_ignores_foreign_echoes() {
    // Scenario: something else is typing during discovery; codes that do
    // not decode to the in-flight character are discarded
    let (mut hook, state) = harness(KeyboardMode::Enabled);
    state.lock().echo = EchoStyle::WrongCode(30);

    let discovered = hook.discover_keycodes("xya").unwrap();

    assert_eq!(
        discovered,
        vec![DiscoveredKey {
            code: KeyCode::new(30),
            ch: 'a'
        }]
    );
}

#[test]
fn e2e_discovery_counts_each_character_once() {
    // Scenario: a bouncy device fires every echo twice
    let (mut hook, state) = harness(KeyboardMode::Enabled);
    state.lock().echo = EchoStyle::DoubleFire;

    let discovered = hook.discover_keycodes("ab").unwrap();

    let chars: Vec<char> = discovered.iter().map(|d| d.ch).collect();
    assert_eq!(chars, vec!['a', 'b']);
}

#[test]
fn e2e_discovery_restores_state_after_sink_failure() {
    // Scenario: the injection path dies mid-discovery; the error comes
    // back but mode and observer are restored first
    struct ForwardCounter {
        hits: Arc<Mutex<usize>>,
    }
    impl InterceptObserver for ForwardCounter {
        fn on_key_forwarded(&mut self, _key: KeyCode) {
            *self.hits.lock() += 1;
        }
    }

    let hits = Arc::new(Mutex::new(0));
    let ctx = Arc::new(EngineContext::new(KeyboardMode::Enabled, false));
    let engine = InterceptionEngine::with_observer(
        ctx,
        Box::new(ForwardCounter {
            hits: Arc::clone(&hits),
        }),
    );
    let sink = ScriptedSink::default();
    let state = Arc::clone(&sink.state);
    let mut hook = HookManager::new(engine, Box::new(sink));
    state.lock().fail_injection = true;

    let result = hook.discover_keycodes("abc");
    assert!(matches!(result, Err(HookError::Injection(_))));
    assert_eq!(hook.engine().context().mode(), KeyboardMode::Enabled);

    // the original observer is back: a forwarded key reaches it
    state.lock().fail_injection = false;
    hook.handle_event(RawKeyEvent::key_press(KeyCode::ESC));
    assert_eq!(*hits.lock(), 1);
}

#[test]
fn e2e_discovery_feeds_font_template() {
    // Scenario: the --init-font workflow end to end, minus the hardware:
    // discover, then build the identity template from the hits
    let (mut hook, _) = harness(KeyboardMode::Enabled);

    let discovered = hook.discover_keycodes("abc").unwrap();
    let template = GlyphFont::from_discovery("learned", discovered.iter().map(|d| d.ch)).unwrap();

    assert_eq!(template.len(), 3);
    assert_eq!(template.resolve('a'), "a");
    let sources: Vec<char> = template.entries().map(|(ch, _)| ch).collect();
    assert_eq!(sources, vec!['a', 'b', 'c']);
}
