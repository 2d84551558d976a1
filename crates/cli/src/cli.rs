//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::RecordingMode;
use std::path::PathBuf;

/// SRVS Recorder - synchronized road video, GPS and sensor dataset recorder
#[derive(Parser, Debug)]
#[command(
    name = "srvs-recorder",
    author,
    version,
    about = "Record synchronized road video, GPS tracks and sensor logs",
    long_about = "Records one dataset session: camera frames, an NMEA GPS track and \n\
                  environmental / IMU sensor data, optionally locked together by a \n\
                  software trigger, plus a metadata document per session."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SRVS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SRVS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Also append logs to a daily file in this directory
    #[arg(long, global = true, env = "SRVS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default level handed to the log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one session
    Run(RunArgs),

    /// Validate configuration file without recording
    Validate(ValidateArgs),

    /// Display the resolved configuration
    Info(InfoArgs),

    /// List serial ports
    Ports(PortsArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "acquisition.toml", env = "SRVS_CONFIG")]
    pub config: PathBuf,

    /// Recording length in seconds (0 = until Ctrl+C / SIGTERM)
    #[arg(short, long, default_value = "0", env = "SRVS_DURATION")]
    pub duration: u64,

    /// Use simulated GPS and sensor devices instead of serial ports
    #[arg(long, env = "SRVS_SIMULATE")]
    pub simulate: bool,

    /// Override the GPS serial port
    #[arg(long, env = "SRVS_GPS_PORT")]
    pub gps_port: Option<String>,

    /// Override the sensor board serial port
    #[arg(long, env = "SRVS_SENSOR_PORT")]
    pub sensor_port: Option<String>,

    /// Override the recording mode
    #[arg(long, value_enum, env = "SRVS_MODE")]
    pub mode: Option<ModeArg>,

    /// Override the dataset root directory
    #[arg(short, long, env = "SRVS_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Validate configuration and exit without recording
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SRVS_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "acquisition.toml", env = "SRVS_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "acquisition.toml", env = "SRVS_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the full configuration in TOML, defaults included
    #[arg(long, conflicts_with = "json")]
    pub toml: bool,
}

/// Arguments for the `ports` command
#[derive(Parser, Debug)]
pub struct PortsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Recording mode as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Continuous,
    Synchronized,
}

impl From<ModeArg> for RecordingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Continuous => RecordingMode::Continuous,
            ModeArg::Synchronized => RecordingMode::Synchronized,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
