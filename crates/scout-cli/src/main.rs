//! `scout-cli` – Scout command line entry point.
//!
//! 1. Loads `~/.scout/config.toml` (first-run wizard when absent) and applies
//!    environment overrides.
//! 2. Prompts once for the backend credentials.
//! 3. Builds the fusion loop and runs it until Ctrl-C or `max_cycles`.
//!
//! Peripherals are the in-process simulated drivers; vendor drivers plug in
//! through the `scout-hal` traits.

mod config;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use zeroize::Zeroizing;

use scout_hal::sim::{SimBuzzer, SimCamera, SimLidar, SimSatellite, SimThermal};
use scout_perception::{
    DetectionGate, Detector, HttpDetector, HttpIpGeolocator, LocationResolver,
    RangingDeviceController, ScriptedDetector,
};
use scout_runtime::{
    AlertController, FusionLoop, HttpTransport, ImageSink, LocalImageSink, ObjectStoreSink,
    Peripherals, SyncClient,
};
use scout_types::ScoutError;

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

fn main() -> ExitCode {
    let _telemetry = scout_runtime::init_tracing("scout");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing the current cycle …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    if !config::config_path().exists() {
        run_first_run_wizard();
    }
    let mut cfg = match config::load() {
        Ok(cfg) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    info!(config = ?cfg, "configuration");

    // ── Credentials ───────────────────────────────────────────────────────
    let email = prompt_line(
        &format!("  Email [{}]: ", cfg.email),
        &cfg.email,
    );
    let password = prompt_secret("  Password: ");

    let mut fusion = match build_loop(&cfg, shutdown) {
        Ok(fusion) => fusion,
        Err(e) => {
            println!("{}: {}", "Startup failed".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match fusion.start(&email, &password) {
        Ok(session) => println!(
            "  {} Authenticated as user ID {}",
            "✓".green().bold(),
            session.user_id.bold()
        ),
        Err(ScoutError::Interrupted) => {
            println!("{}", "Interrupted before login; nothing was started.".yellow());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            println!("{}: {}", "User authentication failed".red().bold(), e);
            return ExitCode::FAILURE;
        }
    }
    drop(password);

    if cfg.email != email {
        cfg.email = email;
        if let Err(e) = config::save(&cfg) {
            warn!(error = %e, "could not remember login email");
        }
    }

    // ── Run ───────────────────────────────────────────────────────────────
    match fusion.run() {
        Ok(summary) => {
            println!(
                "\n  {} {} cycle(s), {} failed. Shutdown complete.",
                "✓".green().bold(),
                summary.cycles,
                summary.failed_cycles
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Run aborted".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

fn build_loop(
    cfg: &config::Config,
    shutdown: Arc<AtomicBool>,
) -> Result<FusionLoop<SimLidar, SimCamera>, ScoutError> {
    let timeout = cfg.request_timeout();

    let detector: Box<dyn Detector> = if cfg.detector_url.is_empty() {
        warn!("no detector_url configured; detection reports nothing");
        Box::new(ScriptedDetector::new())
    } else {
        Box::new(HttpDetector::new(&cfg.detector_url, timeout)?)
    };

    let images: Box<dyn ImageSink> = match cfg.object_store_target().map_err(ScoutError::Config)? {
        Some(target) => {
            info!(bucket = %target.bucket, region = %target.region, "uploading frames to object storage");
            Box::new(ObjectStoreSink::new(&cfg.image_dir, target, timeout)?)
        }
        None => {
            info!(dir = %cfg.image_dir.display(), "S3_BUCKET_NAME not set; saving frames locally");
            Box::new(LocalImageSink::new(&cfg.image_dir))
        }
    };

    info!("using simulated peripherals");
    let peripherals = Peripherals {
        ranging: RangingDeviceController::new(SimLidar::new("lidar")),
        camera: SimCamera::new("camera", FRAME_WIDTH, FRAME_HEIGHT),
        thermal: Some(Box::new(SimThermal::new(22.0, 22.0))),
        location: LocationResolver::new(
            Box::new(SimSatellite::new()),
            Box::new(HttpIpGeolocator::new(&cfg.geolocation_url, timeout)?),
        ),
        detection: DetectionGate::new(detector).with_min_confidence(cfg.min_confidence),
        alerts: AlertController::new(Box::new(SimBuzzer::new("buzzer"))),
    };

    let sync = SyncClient::new(Box::new(HttpTransport::new(&cfg.backend_url, timeout)?));

    Ok(FusionLoop::new(
        cfg.loop_config(),
        peripherals,
        sync,
        images,
        shutdown,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Scout First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Scout.\n");

    let mut cfg = config::Config::default();

    cfg.backend_url = prompt_line(
        &format!("  Backend URL [{}]: ", cfg.backend_url),
        &cfg.backend_url,
    );

    let interval = prompt_line(
        &format!("  Seconds between cycles [{}]: ", cfg.cycle_interval_secs),
        &cfg.cycle_interval_secs.to_string(),
    );
    if let Ok(secs) = interval.trim().parse::<u64>() {
        cfg.cycle_interval_secs = secs;
    }

    let dir = prompt_line(
        &format!("  Local image directory [{}]: ", cfg.image_dir.display()),
        &cfg.image_dir.to_string_lossy(),
    );
    cfg.image_dir = dir.into();

    cfg.detector_url = prompt_line("  Object-detection endpoint (blank to disable): ", "");

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____                  __ "#.bold().cyan());
    println!("{}", r#"  / ___/_________  __  __/ /_"#.bold().cyan());
    println!("{}", r#"  \__ \/ ___/ __ \/ / / / __/"#.bold().cyan());
    println!("{}", r#" ___/ / /__/ /_/ / /_/ / /_  "#.bold().cyan());
    println!("{}", r#"/____/\___/\____/\__,_/\__/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Scout".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Perception and path logging");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

/// Like [`prompt_line`] but the answer is wiped from memory on drop.
fn prompt_secret(msg: &str) -> Zeroizing<String> {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = Zeroizing::new(String::new());
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return Zeroizing::new(String::new());
    }
    Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string())
}
