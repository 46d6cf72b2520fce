//! ccfand
//!
//! GPU temperature watcher driving the external GPU fan on a
//! ComputerController board.
//!
//! Once per second the GPU temperature is read and mapped onto a fan duty
//! between the `--low` and `--high` thresholds. The duty is sent to the
//! board over USB serial whenever it moved by at least the deadband. On
//! Ctrl+C or SIGTERM the fan is reset to 0% before the daemon exits.
//!
//! The serial port is auto-detected unless `--port` is given. Settings can
//! also come from a TOML file; command-line flags take precedence.

mod config;
mod control_loop;
mod sensor;
mod shutdown;

use anyhow::{Context, Result};
use ccfan_core::{default_config_path, StaticConfig};
use ccfan_hardware::{SerialConnector, UsbSerialLocator};
use clap::{Parser, ValueEnum};
use config::CliOverrides;
use control_loop::{ControlLoop, LoopSettings};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;

/// Logging level
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// GPU temperature watcher & ComputerController fan driver
#[derive(Parser, Debug)]
#[command(name = "ccfand")]
#[command(version, about = "GPU temperature watcher & ComputerController fan driver", long_about = None)]
struct Args {
    /// High temperature threshold (°C) for full fan speed [default: 80]
    #[arg(long)]
    high: Option<i32>,

    /// Low temperature threshold (°C) below which the fan is off [default: 70]
    #[arg(long)]
    low: Option<i32>,

    /// Serial port of the ComputerController (auto-detect if omitted)
    #[arg(long)]
    port: Option<String>,

    /// Logging level
    #[arg(long, value_enum, default_value = "info")]
    log: LogLevel,

    /// Path to configuration file
    #[arg(short, long, env = "CCFAN_CONFIG")]
    config: Option<PathBuf>,

    /// Index of the GPU to monitor
    #[arg(long)]
    gpu_index: Option<u32>,

    /// Read temperature from a sysfs thermal zone file instead of the GPU
    #[arg(long, conflicts_with = "gpu_index")]
    thermal_zone: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            high: self.high,
            low: self.low,
            port: self.port.clone(),
            gpu_index: self.gpu_index,
            thermal_zone: self.thermal_zone.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log);

    let static_config = resolve_config(&args)?;

    let settings = LoopSettings::from_config(&static_config);
    info!(
        "Thresholds: fan off at {} °C, full speed at {} °C",
        settings.thresholds.low(),
        settings.thresholds.high()
    );

    let sensor =
        sensor::open(&static_config.sensor).context("Failed to initialize temperature sensor")?;

    let connector = SerialConnector::new(
        static_config.device.baud_rate,
        static_config.device.read_timeout(),
    );
    let control = ControlLoop::new(
        settings,
        Box::new(UsbSerialLocator::<ccfan_core::DefaultDevice>::new()),
        Box::new(connector),
        sensor,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let signal_task = shutdown::spawn_stop_on_signal(stop_tx);

    // Always run the loop to completion so the fan is reset on exit
    let outcome = control.run(stop_rx).await;
    signal_task.abort();

    outcome.context("Fan control stopped")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load the config file and apply command-line overrides
fn resolve_config(args: &Args) -> Result<StaticConfig> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);

    let loaded = config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    config::apply_overrides(loaded, &args.overrides()).context("Invalid command-line settings")
}

/// Initialize tracing subscriber for logging
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
