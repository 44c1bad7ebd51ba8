// Glyphkeys Interception Engine
// Decides what happens to each key press: forward, block, or replace.

use crate::caps::{case_filtered, CapsState};
use crate::font::GlyphFont;
use crate::key::{key_to_char, KeyCode};
use crate::mode::KeyboardMode;
use crate::observer::{InterceptObserver, NullObserver, Severity};
use crate::probe::ModifierProbe;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Engine configuration shared between the host side and the hook thread.
///
/// Mode and beep are atomics; the font is published as an immutable Arc
/// snapshot behind a lock, so the per-keystroke read is a clone of a
/// pointer and never sees a half-updated table.
#[derive(Debug, Default)]
pub struct EngineContext {
    mode: AtomicU8,
    beep_on_block: AtomicBool,
    font: RwLock<Option<Arc<GlyphFont>>>,
}

impl EngineContext {
    pub fn new(mode: KeyboardMode, beep_on_block: bool) -> Self {
        Self {
            mode: AtomicU8::new(mode.as_u8()),
            beep_on_block: AtomicBool::new(beep_on_block),
            font: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> KeyboardMode {
        KeyboardMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: KeyboardMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    pub fn beep_on_block(&self) -> bool {
        self.beep_on_block.load(Ordering::Relaxed)
    }

    pub fn set_beep_on_block(&self, beep: bool) {
        self.beep_on_block.store(beep, Ordering::Relaxed);
    }

    pub fn font(&self) -> Option<Arc<GlyphFont>> {
        self.font.read().clone()
    }

    pub fn has_font(&self) -> bool {
        self.font.read().is_some()
    }

    /// Publish a new font snapshot, or clear it.
    pub fn set_font(&self, font: Option<Arc<GlyphFont>>) {
        *self.font.write() = font;
    }
}

/// What the hook should do with a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Re-emit the key unchanged.
    Forward,
    /// Swallow the key.
    Block,
    /// Swallow the key and synthesize this text instead.
    Replace(String),
}

/// The per-keystroke decision state machine.
///
/// Owns the capitalization flag and the observer; reads mode and font from
/// the shared context once per decision.
pub struct InterceptionEngine {
    ctx: Arc<EngineContext>,
    caps: CapsState,
    observer: Box<dyn InterceptObserver>,
}

impl InterceptionEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self::with_observer(ctx, Box::new(NullObserver))
    }

    pub fn with_observer(ctx: Arc<EngineContext>, observer: Box<dyn InterceptObserver>) -> Self {
        Self {
            ctx,
            caps: CapsState::new(),
            observer,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Swap the observer, returning the previous one. Key-code discovery
    /// uses this to splice in a recorder and restore the original after.
    pub fn swap_observer(
        &mut self,
        observer: Box<dyn InterceptObserver>,
    ) -> Box<dyn InterceptObserver> {
        std::mem::replace(&mut self.observer, observer)
    }

    /// Whether the force-upper flag is currently armed. The flag survives
    /// mode changes on purpose: switching modes back and forth must not
    /// change what the next keystroke produces.
    pub fn capitalization_armed(&self) -> bool {
        self.caps.is_armed()
    }

    pub fn reset_capitalization(&mut self) {
        self.caps.reset();
    }

    pub(crate) fn notify_hook_failure(&mut self, severity: Severity, message: &str) {
        self.observer.on_hook_failure(severity, message);
    }

    /// Decide one key press or repeat. The priority order is load-bearing:
    /// Disabled swallows everything first, then non-standard keys and
    /// bypass modifiers force a pass-through, and only then does the
    /// interception path run.
    pub fn decide(&mut self, key: KeyCode, probe: &ModifierProbe) -> EngineAction {
        let mode = self.ctx.mode();

        if mode == KeyboardMode::Disabled {
            self.observer.on_key_blocked(key);
            return EngineAction::Block;
        }

        let base = match key_to_char(key) {
            Some(base) => base,
            None => {
                self.forward(mode, key);
                return EngineAction::Forward;
            }
        };

        if mode == KeyboardMode::Enabled || probe.bypass_active() {
            self.forward(mode, key);
            return EngineAction::Forward;
        }

        // Interceptable standard key. Resolve the case first, then let the
        // flag upgrade it, then advance the flag on what was produced.
        let filtered = case_filtered(base, probe.shift_down(), probe.caps_lock_on());
        let resolved = self.caps.apply(filtered);
        self.caps.advance(mode, resolved);

        let font = self.ctx.font();
        if font.is_none() && mode == KeyboardMode::Intercept {
            // Nothing to replace with. Drop back to pass-through so typing
            // keeps working, and say so exactly once.
            self.ctx.set_mode(KeyboardMode::Enabled);
            log::warn!("intercept mode without a font, switching to pass-through");
            self.observer
                .on_mode_autoswitch(KeyboardMode::Intercept, KeyboardMode::Enabled);
            self.observer.on_key_forwarded(key);
            return EngineAction::Forward;
        }

        let replacement = match font {
            Some(font) => font.resolve(resolved),
            None => resolved.to_string(),
        };
        self.observer.on_key_intercepted(key, &replacement);
        EngineAction::Replace(replacement)
    }

    /// Pass-through bookkeeping. A forwarded Enter in AutoCapitalization
    /// is a sentence boundary: arm the flag so the next line starts upper.
    fn forward(&mut self, mode: KeyboardMode, key: KeyCode) {
        if mode == KeyboardMode::AutoCapitalization && key == KeyCode::ENTER {
            self.caps.arm();
        }
        self.observer.on_key_forwarded(key);
    }
}
