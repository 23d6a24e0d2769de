use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use ppsntp::{config::CaptureConfig, time::Fudge, EdgeMode};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{gpio::DEFAULT_GPIO_ROOT, shm::MAX_UNIT};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    pub loglevel: LogLevel,
    /// NTP shared memory unit, 0 to 3
    pub unit: u8,
    /// GPIO pin carrying the PPS signal
    pub input_pin: Option<u32>,
    /// GPIO pin toggled on every pulse
    pub output_pin: Option<u32>,
    /// Initial fudge in microseconds
    pub fudge_us: i64,
    pub edge: EdgeMode,
    pub capture: CaptureMode,
    /// Part of every second the polling source sleeps instead of polling
    pub idle_factor: f64,
    /// Number of samples to derive the fudge from, disabled when zero or less
    pub rebase_count: i64,
    pub debug: bool,
    pub foreground: bool,
    pub pidfile: Option<PathBuf>,
    pub gpio_root: PathBuf,
    pub observation_path: Option<PathBuf>,
    pub observation_permissions: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: LogLevel::Info,
            unit: 0,
            input_pin: None,
            output_pin: None,
            fudge_us: 0,
            edge: EdgeMode::Rising,
            capture: CaptureMode::Interrupt,
            idle_factor: 0.95,
            rebase_count: -1,
            debug: false,
            foreground: false,
            pidfile: None,
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            observation_path: None,
            observation_permissions: 0o666,
        }
    }
}

/// How the PPS line is watched
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Sleep until the kernel reports an edge
    Interrupt,
    /// Busy-read the line level around the expected edge
    Polling,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::level_filters::LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl Config {
    /// Parse config from file
    pub fn from_file(file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let meta = std::fs::metadata(&file)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted config file permissions: Others can write.");
        }

        let contents = std::fs::read_to_string(file)?;
        Ok(toml::de::from_str(&contents)?)
    }

    /// Check that the config is reasonable
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.unit > MAX_UNIT {
            warn!("NTP shared memory unit must be between 0 and {MAX_UNIT}.");
            ok = false;
        }

        match self.input_pin {
            None => {
                warn!("No GPIO pin to listen on is configured.");
                ok = false;
            }
            Some(input) if self.output_pin == Some(input) => {
                warn!("The same GPIO pin can't be used for both input and output.");
                ok = false;
            }
            Some(_) => {}
        }

        if !(0.0..1.0).contains(&self.idle_factor) {
            warn!("Idle factor must be at least 0 and less than 1.");
            ok = false;
        }

        ok
    }

    /// Debug mode always shows the per-pulse statistics
    pub fn effective_loglevel(&self) -> LogLevel {
        if self.debug {
            self.loglevel.min(LogLevel::Debug)
        } else {
            self.loglevel
        }
    }

    /// Debug mode never forks into the background
    pub fn daemonize(&self) -> bool {
        !self.foreground && !self.debug
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            fudge: Fudge::from_micros(self.fudge_us),
            edge_mode: self.edge,
            rebase_count: self.rebase_count,
            debug: self.debug,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
