use crate::config::{ConfigError, ConfigOverlay, PARAMETER_COUNT};
use crate::pipeline::MalformedPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Streaming detector of sustained deviations in timestamped sensor data.")]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (KDL); defaults to the per-user config file when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Input file with `timestamp ; value` lines [default: stdin]
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Output file [default: stdout]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Stop at the first malformed input line instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Process every nth input record
    #[arg(index = 1)]
    pub sample_each: Option<i64>,
    /// Initial average absolute difference between samples
    #[arg(index = 2)]
    pub initial_baseline: Option<f64>,
    /// Consecutive over-threshold samples needed to raise an alarm
    #[arg(index = 3)]
    pub points_to_alarm: Option<i64>,
    /// Cooldown after an alarm, in microseconds
    #[arg(index = 4)]
    pub wait_usec: Option<i64>,
    /// Baseline multiplier giving the alarm threshold
    #[arg(index = 5)]
    pub multiplier: Option<i64>,
    /// Smoothing length of the baseline average
    #[arg(index = 6)]
    pub smoothing: Option<i64>,
    /// Length of the pattern window after an alarm, in microseconds
    #[arg(index = 7)]
    pub pattern_usec: Option<i64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration in config-file syntax
    Show,
    /// Write the default configuration to the per-user config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the per-user config path
    Path,
}

impl Cli {
    /// Positional parameters come all together or not at all.
    pub fn overlay(&self) -> Result<ConfigOverlay, ConfigError> {
        let overlay = ConfigOverlay {
            sample_each: self.sample_each,
            initial_baseline: self.initial_baseline,
            points_to_alarm: self.points_to_alarm,
            wait_usec: self.wait_usec,
            multiplier: self.multiplier,
            smoothing: self.smoothing,
            pattern_usec: self.pattern_usec,
        };
        match overlay.provided() {
            0 | PARAMETER_COUNT => Ok(overlay),
            given => Err(ConfigError::Partial { given }),
        }
    }

    pub fn policy(&self) -> MalformedPolicy {
        if self.strict {
            MalformedPolicy::Abort
        } else {
            MalformedPolicy::Skip
        }
    }
}
