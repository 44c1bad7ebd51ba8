// Glyphkeys Daemon
// Grabs the keyboards, runs the interception engine, and persists state
// across restarts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use glyphkeys_core::{
    DeviceCapture, EngineContext, FontStore, GlyphFont, HookManager, InterceptionEngine,
    KeyboardMode, PollOutcome, Settings, UinputSink, DISCOVERY_CHARSET,
};

/// System-wide character replacement for everything you type
#[derive(Parser, Debug)]
#[command(name = "glyphkeys")]
#[command(version)]
#[command(about = "System-wide keyboard glyph substitution", long_about = None)]
struct Args {
    /// Settings file (default: ~/.config/glyphkeys/settings.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Font file to activate, overriding the settings
    #[arg(short, long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Mode to start in, overriding the settings
    /// (enabled, disabled, intercept, auto-capitalization, alter-capitalization)
    #[arg(short, long, value_name = "MODE")]
    mode: Option<String>,

    /// Grab only these devices, by exact name or node path
    /// (can be used multiple times)
    #[arg(short, long, value_name = "DEVICE")]
    device: Vec<String>,

    /// List available keyboard devices and exit
    #[arg(long)]
    list_devices: bool,

    /// List fonts in the font library and exit
    #[arg(long)]
    list_fonts: bool,

    /// Validate a font file and exit
    #[arg(long, value_name = "PATH")]
    check_font: Option<PathBuf>,

    /// Run key-code discovery and save an identity font template
    #[arg(long, value_name = "NAME")]
    init_font: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct Application {
    args: Args,
    running: Arc<AtomicBool>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let app = Application {
        args,
        running: Arc::new(AtomicBool::new(true)),
    };
    if let Err(err) = app.dispatch() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

impl Application {
    fn dispatch(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.args.list_devices {
            return self.list_devices();
        }
        if let Some(ref path) = self.args.check_font {
            return self.check_font(path);
        }

        let settings_path = self
            .args
            .config
            .clone()
            .or_else(Settings::default_path)
            .ok_or("cannot resolve a config directory")?;
        let mut settings = Settings::load_or_default(&settings_path)?;
        self.apply_overrides(&mut settings)?;

        if self.args.list_fonts {
            return self.list_fonts(&settings);
        }

        let ctx = Arc::new(EngineContext::new(settings.mode, settings.beep_on_block));
        if let Some(ref path) = settings.current_font {
            match GlyphFont::load(path) {
                Ok(font) => {
                    log::info!("active font: {} ({} entries)", font.name(), font.len());
                    ctx.set_font(Some(Arc::new(font)));
                }
                Err(err) => log::warn!("font {} not loaded: {}", path.display(), err),
            }
        }

        let sink = UinputSink::new(settings.echo_timeout_ms)?;
        let engine = InterceptionEngine::new(Arc::clone(&ctx));
        let mut hook = HookManager::new(engine, Box::new(sink));

        if let Some(ref name) = self.args.init_font {
            return self.init_font(&mut hook, &settings, name);
        }

        self.run(&mut hook, &ctx, &mut settings, &settings_path)
    }

    /// Merge command line overrides into the loaded settings.
    fn apply_overrides(&self, settings: &mut Settings) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mode) = self.args.mode {
            settings.mode = mode
                .parse::<KeyboardMode>()
                .map_err(|_| format!("unknown mode {:?}", mode))?;
        }
        if !self.args.device.is_empty() {
            settings.device_filter = self.args.device.clone();
        }
        if let Some(ref font) = self.args.font {
            settings.current_font = Some(font.clone());
        }
        Ok(())
    }

    fn list_devices(&self) -> Result<(), Box<dyn std::error::Error>> {
        let devices = DeviceCapture::list_devices()?;
        println!("Found {} keyboard device(s):", devices.len());
        for device in &devices {
            println!("  {}: {} ({})", device.index, device.name, device.path);
        }
        Ok(())
    }

    fn list_fonts(&self, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
        let store = self.font_store(settings)?;
        let fonts = store.load_all()?;
        println!("Found {} font(s) in {}:", fonts.len(), store.dir().display());
        for (path, font) in &fonts {
            println!(
                "  {} ({} entries) - {}",
                font.name(),
                font.len(),
                path.display()
            );
        }
        Ok(())
    }

    fn check_font(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let font = GlyphFont::load(path)?;
        println!(
            "{}: ok ({} entries{})",
            font.name(),
            font.len(),
            if font.description().is_empty() {
                String::new()
            } else {
                format!(", {}", font.description())
            }
        );
        Ok(())
    }

    fn font_store(&self, settings: &Settings) -> Result<FontStore, Box<dyn std::error::Error>> {
        let dir = settings
            .fonts_dir
            .clone()
            .or_else(FontStore::default_dir)
            .ok_or("cannot resolve a fonts directory")?;
        Ok(FontStore::new(dir))
    }

    /// Learn the key-code table and write an identity font template the
    /// user can fill with glyphs.
    fn init_font(
        &self,
        hook: &mut HookManager,
        settings: &Settings,
        name: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        hook.register(&settings.device_filter)?;
        let discovered = hook.discover_keycodes(DISCOVERY_CHARSET)?;
        hook.shutdown();

        if discovered.is_empty() {
            return Err("discovery confirmed no characters; is the virtual device working?".into());
        }
        let store = self.font_store(settings)?;
        let mut font = GlyphFont::from_discovery(name, discovered.iter().map(|d| d.ch))?;
        let path = store.save(&mut font)?;
        println!(
            "Font template '{}' with {} entries written to {}",
            name,
            font.len(),
            path.display()
        );
        Ok(())
    }

    fn run(
        &self,
        hook: &mut HookManager,
        ctx: &Arc<EngineContext>,
        settings: &mut Settings,
        settings_path: &PathBuf,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Fail open: without a grab the daemon idles and every keystroke
        // keeps reaching the OS untouched.
        if let Err(err) = hook.register(&settings.device_filter) {
            log::error!("running without interception: {}", err);
        }

        self.spawn_signal_handler()?;

        log::info!(
            "glyphkeys running, mode {}, {} device(s) grabbed",
            ctx.mode(),
            hook.device_names().len()
        );
        println!("glyphkeys is running. Press Ctrl+C to exit.");

        while self.running.load(Ordering::SeqCst) {
            match hook.run_once(
                settings.poll_timeout_ms as i32,
                settings.emergency_eject_key,
            ) {
                Ok(PollOutcome::Eject) => {
                    println!("Emergency eject key pressed. Stopping glyphkeys.");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    log::error!("event loop error: {}", err);
                    break;
                }
            }
        }

        hook.shutdown();

        // Persist what the user last had: mode and beep may have changed
        // at runtime (including the no-font autoswitch).
        settings.mode = ctx.mode();
        settings.beep_on_block = ctx.beep_on_block();
        if let Err(err) = settings.save(settings_path) {
            log::warn!("settings not saved: {}", err);
        } else {
            log::info!("settings saved to {}", settings_path.display());
        }
        log::info!("glyphkeys stopped");
        Ok(())
    }

    fn spawn_signal_handler(&self) -> Result<(), Box<dyn std::error::Error>> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let running = Arc::clone(&self.running);
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                println!("\nReceived signal, shutting down gracefully...");
                running.store(false, Ordering::SeqCst);
            }
        });
        Ok(())
    }
}
