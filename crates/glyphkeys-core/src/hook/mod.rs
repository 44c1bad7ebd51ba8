// Glyphkeys Hook Manager
// Owns the keyboard grab, routes every event, and executes the engine's
// decisions through the output sink.

pub mod discovery;

use crate::action::KeyAction;
use crate::capture::{CaptureError, DeviceCapture};
use crate::engine::{EngineAction, InterceptionEngine};
use crate::key::KeyCode;
use crate::observer::Severity;
use crate::probe::ModifierProbe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// evdev event type for key events.
pub const EV_KEY: u16 = 0x01;

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// A grabbed physical device.
    Physical,
    /// Our own virtual output device, read back through the loopback tap.
    Loopback,
}

/// One input event as the hook sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
    pub origin: EventOrigin,
}

impl RawKeyEvent {
    pub fn new(event_type: u16, code: u16, value: i32, origin: EventOrigin) -> Self {
        Self {
            event_type,
            code,
            value,
            origin,
        }
    }

    pub fn key_press(key: KeyCode) -> Self {
        Self::new(EV_KEY, key.code(), 1, EventOrigin::Physical)
    }

    pub fn key_release(key: KeyCode) -> Self {
        Self::new(EV_KEY, key.code(), 0, EventOrigin::Physical)
    }

    pub fn key_repeat(key: KeyCode) -> Self {
        Self::new(EV_KEY, key.code(), 2, EventOrigin::Physical)
    }

    /// Same event, marked as coming from the loopback tap.
    pub fn as_loopback(mut self) -> Self {
        self.origin = EventOrigin::Loopback;
        self
    }

    pub fn is_key(&self) -> bool {
        self.event_type == EV_KEY
    }

    pub fn key_code(&self) -> KeyCode {
        KeyCode::new(self.code)
    }

    pub fn action(&self) -> Option<KeyAction> {
        KeyAction::from_value(self.value)
    }
}

/// Hook-level errors: capture trouble and synthesis trouble.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("device capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("synthetic injection failed: {0}")]
    Injection(String),

    #[error("output device unavailable: {0}")]
    Output(String),
}

/// Platform output seam.
///
/// Production is the uinput sink; tests script one. `inject_text` is
/// synchronous: it returns the loopback echoes its own writes produced,
/// in order, so the caller can route them deterministically.
pub trait KeySink: Send {
    /// Re-emit a physical event unchanged. Loopback events are already on
    /// their way to the OS and must be ignored here, or every echo would
    /// echo again.
    fn forward(&mut self, event: &RawKeyEvent) -> Result<(), HookError>;

    /// Press the keys for every character of `text` on the virtual device
    /// and collect the echoes that come back through the tap.
    fn inject_text(&mut self, text: &str) -> Result<Vec<RawKeyEvent>, HookError>;

    /// Audible alert for beep-on-block.
    fn alert(&mut self);

    /// Discard stale loopback echoes (from earlier forwards).
    fn flush_echoes(&mut self) {}

    /// Release anything the sink still holds down. Called at shutdown.
    fn release_held(&mut self) {}
}

/// Re-entrancy guard around synthetic injection.
///
/// While a span is live, loopback events are forwarded untouched instead
/// of being decided, which is what keeps Intercept mode from feeding on
/// its own output. The span clears on drop, so a failed injection can
/// never leave the guard stuck.
#[derive(Debug, Default)]
pub struct SelfEchoGuard {
    engaged: Arc<AtomicBool>,
}

impl SelfEchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    pub fn engage(&self) -> EchoSpan {
        self.engaged.store(true, Ordering::Release);
        EchoSpan {
            engaged: Arc::clone(&self.engaged),
        }
    }
}

/// Live span of one synthesis.
pub struct EchoSpan {
    engaged: Arc<AtomicBool>,
}

impl Drop for EchoSpan {
    fn drop(&mut self) {
        self.engaged.store(false, Ordering::Release);
    }
}

/// What the hook did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Passed through: non-key event, release, guarded echo, or a
    /// forwarding decision.
    Forwarded,
    /// Swallowed.
    Blocked,
    /// Swallowed, synthetic replacement sent.
    Replaced,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No grab installed, nothing to poll.
    Idle,
    /// This many events were routed (zero on a quiet timeout).
    Handled(usize),
    /// The emergency eject key was pressed.
    Eject,
}

/// Owns the grab, the sink, the probe, and the echo guard.
pub struct HookManager {
    engine: InterceptionEngine,
    probe: ModifierProbe,
    sink: Box<dyn KeySink>,
    guard: SelfEchoGuard,
    capture: Option<DeviceCapture>,
}

impl HookManager {
    pub fn new(engine: InterceptionEngine, sink: Box<dyn KeySink>) -> Self {
        Self {
            engine,
            probe: ModifierProbe::new(),
            sink,
            guard: SelfEchoGuard::new(),
            capture: None,
        }
    }

    pub fn engine(&self) -> &InterceptionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut InterceptionEngine {
        &mut self.engine
    }

    pub fn probe(&self) -> &ModifierProbe {
        &self.probe
    }

    pub fn is_registered(&self) -> bool {
        self.capture.is_some()
    }

    pub fn guard_engaged(&self) -> bool {
        self.guard.is_engaged()
    }

    /// Install the grab. Re-registering releases the old grab first. On
    /// failure the hook stays unregistered and keys keep flowing straight
    /// to the OS; the caller decides whether to retry or idle.
    pub fn register(&mut self, device_filter: &[String]) -> Result<(), HookError> {
        if self.capture.is_some() {
            self.unregister();
        }
        match DeviceCapture::grab_keyboards(device_filter) {
            Ok(capture) => {
                log::info!("grabbed {} keyboard device(s)", capture.device_count());
                self.capture = Some(capture);
                Ok(())
            }
            Err(err) => {
                log::error!("keyboard grab failed: {}", err);
                self.engine
                    .notify_hook_failure(Severity::Error, &format!("keyboard grab failed: {}", err));
                Err(HookError::Capture(err))
            }
        }
    }

    /// Release the grab. Idempotent.
    pub fn unregister(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.ungrab_all();
            log::info!("keyboard grab released");
        }
    }

    /// Release the grab and anything still held on the output side.
    pub fn shutdown(&mut self) {
        self.unregister();
        self.sink.release_held();
    }

    pub fn device_names(&self) -> Vec<String> {
        self.capture
            .as_ref()
            .map(|c| c.device_names())
            .unwrap_or_default()
    }

    /// Poll the grabbed devices once and route everything that arrived.
    pub fn run_once(
        &mut self,
        timeout_ms: i32,
        eject_key: Option<KeyCode>,
    ) -> Result<PollOutcome, HookError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(PollOutcome::Idle);
        };
        let events = capture.poll(timeout_ms)?;
        // forwarded keys echo into the tap; keep it drained between
        // syntheses so the queue cannot grow without bound
        self.sink.flush_echoes();
        let mut handled = 0;
        for event in events {
            if let Some(eject) = eject_key {
                if event.origin == EventOrigin::Physical
                    && event.is_key()
                    && event.code == eject.code()
                    && event.action() == Some(KeyAction::Press)
                {
                    log::warn!("emergency eject key pressed, releasing the grab");
                    return Ok(PollOutcome::Eject);
                }
            }
            self.handle_event(event);
            handled += 1;
        }
        Ok(PollOutcome::Handled(handled))
    }

    /// Route one event. Never fails: per-event trouble is logged and the
    /// stream keeps flowing.
    pub fn handle_event(&mut self, event: RawKeyEvent) -> Disposition {
        if !event.is_key() {
            self.forward_quietly(&event);
            return Disposition::Forwarded;
        }
        let key = event.key_code();
        let action = match event.action() {
            Some(action) => action,
            None => {
                self.forward_quietly(&event);
                return Disposition::Forwarded;
            }
        };

        // Probe first: modifier state must track every transition, echoes
        // and releases included, before anything is decided.
        self.probe.observe(key, action);

        if self.guard.is_engaged() && event.origin == EventOrigin::Loopback {
            self.forward_quietly(&event);
            return Disposition::Forwarded;
        }

        if action.is_release() {
            self.forward_quietly(&event);
            return Disposition::Forwarded;
        }

        let disposition = match self.engine.decide(key, &self.probe) {
            EngineAction::Forward => {
                self.forward_quietly(&event);
                Disposition::Forwarded
            }
            EngineAction::Block => {
                if self.engine.context().beep_on_block() {
                    self.sink.alert();
                }
                Disposition::Blocked
            }
            EngineAction::Replace(text) => {
                if let Err(err) = self.synthesize(&text) {
                    log::error!("synthesis failed, keystroke dropped: {}", err);
                    self.engine.notify_hook_failure(
                        Severity::Warning,
                        &format!("synthesis failed: {}", err),
                    );
                }
                Disposition::Replaced
            }
        };
        log::trace!(
            "key={} origin={:?} disposition={:?}",
            key, event.origin, disposition
        );
        disposition
    }

    /// Inject `text` under the self-echo guard and route the echoes back
    /// through the hook. The guard is released on every path out.
    pub fn synthesize(&mut self, text: &str) -> Result<(), HookError> {
        self.sink.flush_echoes();
        let _span = self.guard.engage();
        let echoes = self.sink.inject_text(text)?;
        for echo in echoes {
            self.handle_event(echo);
        }
        Ok(())
    }

    fn forward_quietly(&mut self, event: &RawKeyEvent) {
        if let Err(err) = self.sink.forward(event) {
            log::error!("forward failed for {}: {}", event.key_code(), err);
        }
    }
}
