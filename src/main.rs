use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, info};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use pickarm::bridge::observed_text;
use pickarm::cloud::{FirebaseClient, MemoryStore, StatusStore};
use pickarm::config::Config;
use pickarm::daemon::{Controller, ControllerConfig, StopReason};
use pickarm::motion::Sequencer;
use pickarm::servo::{MockServoBus, ServoBus};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pickarm")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("pickarm.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // Admit every level; the effective one is set once the config is loaded
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .target(env_logger::Target::Pipe(target))
        .init();
    apply_log_level(LevelFilter::Info);

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Set the effective level unless RUST_LOG already chose one.
fn apply_log_level(level: LevelFilter) {
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(level);
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_run_command(false, config).await,
        Some(Commands::Run { dry_run }) => handle_run_command(*dry_run, config).await,
        Some(Commands::Sequence { dry_run, publish }) => {
            handle_sequence_command(*dry_run, *publish, config).await
        }
        Some(Commands::Reset { neutral, dry_run }) => {
            handle_reset_command(*neutral, *dry_run, config).await
        }
        Some(Commands::Status) => handle_status_command(config).await,
        Some(Commands::SetStatus { value }) => handle_set_status_command(value, config).await,
    }
}

/// Open the PCA9685, or the recording fake for dry runs.
fn open_servo_bus(config: &Config, dry_run: bool) -> Result<Box<dyn ServoBus>> {
    if dry_run {
        info!("Dry run: using simulated servo bus");
        println!("{}", "Dry run: servo writes are simulated".yellow());
        return Ok(Box::new(MockServoBus::new(config.servo.channels)));
    }
    open_pca9685(config)
}

#[cfg(target_os = "linux")]
fn open_pca9685(config: &Config) -> Result<Box<dyn ServoBus>> {
    use pickarm::servo::Pca9685;
    use pickarm::servo::i2c::I2cRegisters;

    let registers = I2cRegisters::open(config.servo.i2c_bus, config.servo.address)
        .context("Failed to open I2C bus")?;
    let chip = Pca9685::new(registers, config.servo.frequency_hz)
        .context("Failed to initialise PCA9685")?;
    info!(
        "PCA9685 at {:#04x} on /dev/i2c-{}, {} Hz",
        config.servo.address, config.servo.i2c_bus, config.servo.frequency_hz
    );
    Ok(Box::new(chip))
}

#[cfg(not(target_os = "linux"))]
fn open_pca9685(_config: &Config) -> Result<Box<dyn ServoBus>> {
    eyre::bail!("PCA9685 access needs Linux I2C; use --dry-run")
}

async fn connect_store(config: &Config) -> Result<Arc<FirebaseClient>> {
    config.validate_for_cloud()?;
    let client = FirebaseClient::connect(
        &config.cloud.database_url,
        &config.cloud.auth,
        config.cloud.connect_timeout(),
    )
    .await
    .context("Failed to connect to Firebase")?;
    info!("Connected to {}", config.cloud.database_url);
    Ok(Arc::new(client))
}

fn build_sequencer<P: StatusStore>(
    config: &Config,
    bus: Box<dyn ServoBus>,
    store: Arc<P>,
) -> Result<Sequencer<Box<dyn ServoBus>, P>> {
    let sequencer = Sequencer::new(bus, store, config.motion_settings()).with_script(config.script())?;
    Ok(sequencer)
}

async fn handle_run_command(dry_run: bool, config: &Config) -> Result<()> {
    info!("Running trigger service (dry run: {})", dry_run);
    let store = connect_store(config).await?;
    let bus = open_servo_bus(config, dry_run)?;
    let sequencer = build_sequencer(config, bus, Arc::clone(&store))?;

    let controller_config = ControllerConfig {
        status_key: config.cloud.status_path.clone(),
        servo_key: config.cloud.servo_path.clone(),
        trigger_value: config.cloud.trigger_value.clone(),
        pulse_range: config.pulse_range()?,
        connect_timeout: config.cloud.connect_timeout(),
    };
    let controller = Controller::new(sequencer, store, controller_config);

    let report = controller
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Controller failed")?;

    match report.reason {
        StopReason::Interrupted => println!("{}", "Interrupted, servos set to neutral".yellow()),
        StopReason::StreamEnded => println!("{}", "Status subscription ended".yellow()),
    }
    println!("{} {}", "Tasks completed:".green(), report.tasks_completed);
    info!("Stopped: {:?}", report);
    Ok(())
}

async fn handle_sequence_command(dry_run: bool, publish: bool, config: &Config) -> Result<()> {
    info!("Running sequence once (dry run: {}, publish: {})", dry_run, publish);
    let bus = open_servo_bus(config, dry_run)?;

    let report = if publish {
        let store = connect_store(config).await?;
        let mut sequencer = build_sequencer(config, bus, store)?;
        sequencer.calibrate(config.pulse_range()?)?;
        sequencer.reset_to_default().await?;
        sequencer.run_default_sequence().await?
    } else {
        let store = Arc::new(MemoryStore::new());
        let mut sequencer = build_sequencer(config, bus, Arc::clone(&store))?;
        sequencer.calibrate(config.pulse_range()?)?;
        sequencer.reset_to_default().await?;
        let report = sequencer.run_default_sequence().await?;
        for (key, value) in store.writes() {
            println!("{} {} = {}", "Not published:".yellow(), key, value);
        }
        report
    };

    println!(
        "{} {} ({} writes, {:.3}s total)",
        "Sequence finished:".green(),
        report.script,
        report.writes,
        report.total.as_secs_f64()
    );
    Ok(())
}

async fn handle_reset_command(neutral: bool, dry_run: bool, config: &Config) -> Result<()> {
    info!("Resetting arm (neutral: {}, dry run: {})", neutral, dry_run);
    let bus = open_servo_bus(config, dry_run)?;
    let mut sequencer = build_sequencer(config, bus, Arc::new(MemoryStore::new()))?;
    sequencer.calibrate(config.pulse_range()?)?;

    if neutral {
        sequencer.neutral()?;
        println!(
            "{} {}",
            "All joints set to".green(),
            config.motion.neutral_angle
        );
    } else {
        sequencer.reset_to_default().await?;
        println!("{} {}", "Default pose:".green(), config.motion.default_pose);
    }
    Ok(())
}

async fn handle_status_command(config: &Config) -> Result<()> {
    let store = connect_store(config).await?;
    let key = &config.cloud.status_path;
    let value = store.get(key).await.context("Failed to read status")?;
    info!("Read {} = {:?}", key, value);

    match value.as_ref().and_then(observed_text) {
        Some(text) => println!("{} {}", format!("{}:", key).cyan(), text),
        None => println!("{} {}", format!("{}:", key).cyan(), "(not set)".dimmed()),
    }
    Ok(())
}

async fn handle_set_status_command(value: &str, config: &Config) -> Result<()> {
    let store = connect_store(config).await?;
    let key = &config.cloud.status_path;
    store
        .set(key, Value::String(value.to_string()))
        .await
        .context("Failed to write status")?;
    info!("Wrote {} = {}", key, value);
    println!("{} {} = {}", "Status set:".green(), key, value);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging first so config fallbacks are recorded
    setup_logging().context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    apply_log_level(config.log_level_filter());

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
