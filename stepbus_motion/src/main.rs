//! stepbus: multi-stepper shift register motion runner
//!
//! Loads a TOML config (register chain, motors, move script), runs the
//! scripted moves with per-motor serialization and cross-motor
//! concurrency, and de-energizes the coils on exit, including Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Run the move script with the configured driver
//! stepbus --config config/stepbus.toml
//!
//! # Force a specific sink driver
//! stepbus -c config/stepbus.toml --driver simulation
//!
//! # Verbose logging
//! stepbus -c config/stepbus.toml -v
//! ```

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use stepbus_common::config::{ConfigLoader, LogLevel};
use stepbus_motion::config::{MotionConfig, MoveConfig};
use stepbus_motion::drivers::builtin_registry;
use stepbus_motion::{MotionError, RotationHandle, Stepper, StepperBank};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// stepbus: coordinated stepper motion over a shared shift register
#[derive(Parser, Debug)]
#[command(name = "stepbus")]
#[command(version)]
#[command(about = "Coordinated stepper motion over a shared shift register")]
struct Args {
    /// Path to the motion configuration TOML.
    #[arg(short, long, default_value = "config/stepbus.toml")]
    config: PathBuf,

    /// Override the configured sink driver.
    #[arg(short, long)]
    driver: Option<String>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match MotionConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stepbus: cannot load {}: {e}", args.config.display());
            process::exit(2);
        }
    };

    setup_tracing(&args, config.shared.log_level);

    if let Err(e) = run(&args, config) {
        error!("stepbus failed: {e}");
        process::exit(1);
    }
}

fn run(args: &Args, config: MotionConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    info!(
        "stepbus v{} starting as '{}'...",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );
    if detect_rt_mode() {
        info!("running under a real-time scheduler");
    }

    let driver_name = args.driver.as_deref().unwrap_or(&config.register.driver);
    let registry = builtin_registry();
    let sink = registry.create(driver_name)?;
    info!(
        driver = driver_name,
        width_bits = config.register.width_bits,
        "sink ready"
    );

    let mut bank = StepperBank::new(sink, config.register.width_bits)?;
    let mut motors: HashMap<String, Stepper> = HashMap::new();
    for motor_cfg in &config.motors {
        let profile = config.motor_defaults.resolve(motor_cfg);
        let stepper = bank.add_motor(&motor_cfg.name, profile)?;
        motors.insert(motor_cfg.name.clone(), stepper);
    }

    let running = bank.shutdown_flag();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        running.store(true, Ordering::Release);
    })?;

    let outcome = run_moves(&bank, &motors, &config.moves);

    for (name, stepper) in &motors {
        info!(motor = %name, angle = stepper.angle(), "final position");
    }
    info!(register = bank.register_value(), "final register");

    // All handles are joined by now; nothing can re-energize after this.
    bank.de_energize()?;
    info!("coils de-energized, exiting");

    outcome
}

/// Execute the move script.
///
/// Moves on the same motor run in issue order (the previous handle is
/// joined before the next is issued); moves on different motors overlap.
fn run_moves(
    bank: &StepperBank,
    motors: &HashMap<String, Stepper>,
    moves: &[MoveConfig],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut in_flight: HashMap<String, RotationHandle> = HashMap::new();
    let mut first_error: Option<MotionError> = None;

    for mv in moves {
        if bank.is_shutting_down() || first_error.is_some() {
            break;
        }
        if let Some(handle) = in_flight.remove(&mv.motor) {
            settle(handle, &mut first_error);
            if first_error.is_some() {
                break;
            }
        }
        let Some(stepper) = motors.get(&mv.motor) else {
            warn!(motor = %mv.motor, "skipping move for unknown motor");
            continue;
        };
        let result = match (mv.go_angle, mv.rotate) {
            (Some(target), None) => stepper.go_angle(target),
            (None, Some(delta)) => stepper.rotate(delta),
            _ => {
                warn!(motor = %mv.motor, "skipping malformed move");
                continue;
            }
        };
        match result {
            Ok(handle) => {
                in_flight.insert(mv.motor.clone(), handle);
            }
            Err(e) => {
                error!(motor = %mv.motor, error = %e, "move rejected");
                first_error = Some(e);
            }
        }
    }

    for (_, handle) in in_flight.drain() {
        settle(handle, &mut first_error);
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Join one rotation handle, folding its outcome into `first_error`.
fn settle(handle: RotationHandle, first_error: &mut Option<MotionError>) {
    match handle.join() {
        Ok(report) if report.cancelled => {
            info!(
                steps_taken = report.steps_taken,
                steps_requested = report.steps_requested,
                "rotation cancelled"
            );
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "rotation failed");
            if first_error.is_none() {
                *first_error = Some(e);
            }
        }
    }
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, config_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(config_level)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

/// Detect if running in real-time mode by checking the scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
