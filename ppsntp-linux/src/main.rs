use std::{convert::Infallible, io, path::PathBuf, process::ExitCode};

use clap::Parser;
use ppsntp::{
    config::CaptureConfig, observability::CaptureState, time::Fudge, CaptureError, CaptureLoop,
    EdgeMode, EdgeSource, OutputPulser, ShmPublisher,
};
use ppsntp_linux::{
    clock::RealtimeClock,
    config::{CaptureMode, Config, ConfigError, LogLevel},
    gpio::{
        Direction, GpioError, InterruptEdgeSource, PollingEdgeSource, SysfsGpio, SysfsOutputLine,
    },
    observer, setup,
    setup::{SetupError, StartupStep},
    setup_logger,
    shm::SysvSegment,
};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Configuration file to use; command line options override its values
    #[clap(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// Set desired logging level
    #[clap(short, long, value_enum)]
    loglevel: Option<LogLevel>,

    /// NTP shared memory unit number, 0 to 3
    #[clap(short = 'N', long)]
    unit: Option<u8>,

    /// GPIO pin to listen on
    #[clap(short = 'g', long)]
    gpio_pin: Option<u32>,

    /// Toggle this GPIO pin on every pulse, so delays can be measured using a
    /// scope
    #[clap(short = 'p', long)]
    output_pin: Option<u32>,

    /// Fudge factor in microseconds
    #[clap(short = 'F', long, allow_negative_numbers = true)]
    fudge: Option<i64>,

    /// Wake up on both rising and falling edges, but ignore falling ones
    #[clap(short = 'b', long)]
    both_edges: bool,

    /// Poll the line level, for when the device does not support interrupts
    /// on GPIO state changes
    #[clap(short = 'P', long)]
    polling: bool,

    /// When polling: part of every second to sleep instead of polling, e.g.
    /// 0.95
    #[clap(short = 'i', long)]
    idle_factor: Option<f64>,

    /// Measure the offset this many times, then use the average as fudge.
    /// Useful with a pulse source that is not synchronized, e.g. a TCXO
    #[clap(short = 'R', long, allow_negative_numbers = true)]
    rebase: Option<i64>,

    /// Log statistics for every pulse; implies --foreground
    #[clap(short, long)]
    debug: bool,

    /// Do not fork into the background
    #[clap(short, long)]
    foreground: bool,

    /// Write the process id to this file
    #[clap(long)]
    pidfile: Option<PathBuf>,

    /// Mount point of the sysfs GPIO class
    #[clap(long)]
    gpio_root: Option<PathBuf>,

    /// Serve the capture state as JSON on a unix socket at this path
    #[clap(long)]
    observation_path: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);

        Ok(config)
    }

    fn apply(self, config: &mut Config) {
        if let Some(loglevel) = self.loglevel {
            config.loglevel = loglevel;
        }
        if let Some(unit) = self.unit {
            config.unit = unit;
        }
        if let Some(pin) = self.gpio_pin {
            config.input_pin = Some(pin);
        }
        if let Some(pin) = self.output_pin {
            config.output_pin = Some(pin);
        }
        if let Some(fudge) = self.fudge {
            config.fudge_us = fudge;
        }
        if self.both_edges {
            config.edge = EdgeMode::Both;
        }
        if self.polling {
            config.capture = CaptureMode::Polling;
        }
        if let Some(idle_factor) = self.idle_factor {
            config.idle_factor = idle_factor;
        }
        if let Some(rebase) = self.rebase {
            config.rebase_count = rebase;
        }
        config.debug |= self.debug;
        config.foreground |= self.foreground;
        if self.pidfile.is_some() {
            config.pidfile = self.pidfile;
        }
        if let Some(root) = self.gpio_root {
            config.gpio_root = root;
        }
        if self.observation_path.is_some() {
            config.observation_path = self.observation_path;
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("capture stopped: {0}")]
    Capture(#[from] CaptureError<GpioError, io::Error, GpioError>),
}

fn main() -> ExitCode {
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logger(config.effective_loglevel().into()) {
        eprintln!("Could not setup logging: {e}");
        return ExitCode::FAILURE;
    }

    info!("ppsntp v{}", env!("CARGO_PKG_VERSION"));

    let (true, Some(input_pin)) = (config.check(), config.input_pin) else {
        return ExitCode::FAILURE;
    };

    let error = match run(&config, input_pin) {
        Ok(never) => match never {},
        Err(error) => error,
    };

    error!("{error}");
    ExitCode::FAILURE
}

fn run(config: &Config, input_pin: u32) -> Result<Infallible, DaemonError> {
    let input = SysfsGpio::open(&config.gpio_root, input_pin, Direction::Input)?;

    if config.debug {
        info!("NTP unit : {}", config.unit);
        info!("Fudge    : {}", Fudge::from_micros(config.fudge_us));
        if config.capture == CaptureMode::Polling {
            info!("Polling mode");
        }
        if !config.foreground {
            info!("\"Fork into the background\" disabled because of debug mode.");
        }
    }

    let segment = SysvSegment::attach(config.unit)?;

    let output = config
        .output_pin
        .map(|pin| SysfsOutputLine::open(&config.gpio_root, pin))
        .transpose()?;

    setup::set_nice()?;
    setup::set_realtime_priority()?;

    for step in StartupStep::plan(config.daemonize(), config.pidfile.as_deref()) {
        step.run()?;
    }

    let (state_sender, state_receiver) = watch::channel(CaptureState::default());
    if let Some(path) = &config.observation_path {
        observer::spawn(path.clone(), config.observation_permissions, state_receiver).map_err(
            |source| SetupError {
                operation: "spawning the state observer",
                source,
            },
        )?;
    }

    let publisher = ShmPublisher::new(segment);
    let pulser = OutputPulser::new(output, false);
    let capture_config = config.capture_config();

    let error = match config.capture {
        CaptureMode::Interrupt => capture(
            capture_config,
            InterruptEdgeSource::new(input, config.edge)?,
            publisher,
            pulser,
            &state_sender,
        ),
        CaptureMode::Polling => capture(
            capture_config,
            PollingEdgeSource::new(input, config.idle_factor)?,
            publisher,
            pulser,
            &state_sender,
        ),
    };

    Err(error.into())
}

fn capture<S: EdgeSource<Error = GpioError>>(
    config: CaptureConfig,
    source: S,
    publisher: ShmPublisher<SysvSegment>,
    pulser: OutputPulser<SysfsOutputLine>,
    state: &watch::Sender<CaptureState>,
) -> CaptureError<GpioError, io::Error, GpioError> {
    let mut capture = CaptureLoop::new(config, source, RealtimeClock, publisher, pulser);

    capture.run(|capture, _| {
        state.send_replace(capture.state());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINARY: &str = "/usr/bin/ppsntp";

    #[test]
    fn cli_short_options() {
        let arguments = &[
            BINARY, "-N", "1", "-g", "18", "-p", "23", "-F", "-1500", "-b", "-P", "-i", "0.9",
            "-R", "60", "-d", "-f",
        ];

        let config = Args::try_parse_from(arguments)
            .unwrap()
            .into_config()
            .unwrap();

        assert_eq!(
            config,
            Config {
                unit: 1,
                input_pin: Some(18),
                output_pin: Some(23),
                fudge_us: -1500,
                edge: EdgeMode::Both,
                capture: CaptureMode::Polling,
                idle_factor: 0.9,
                rebase_count: 60,
                debug: true,
                foreground: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn cli_defaults() {
        let config = Args::try_parse_from([BINARY, "-g", "4"])
            .unwrap()
            .into_config()
            .unwrap();

        assert_eq!(
            config,
            Config {
                input_pin: Some(4),
                ..Default::default()
            }
        );
    }

    #[test]
    fn cli_overrides_config_file() {
        let path = std::env::temp_dir().join(format!("ppsntp-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "input-pin = 4\nunit = 2\nfudge-us = 100\n").unwrap();

        let config = Args::try_parse_from([
            BINARY,
            "-c",
            path.to_str().unwrap(),
            "--unit",
            "3",
            "--loglevel",
            "trace",
        ])
        .unwrap()
        .into_config()
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.input_pin, Some(4));
        assert_eq!(config.unit, 3);
        assert_eq!(config.fudge_us, 100);
        assert_eq!(config.loglevel, LogLevel::Trace);
    }

    #[test]
    fn missing_config_file() {
        let result = Args::try_parse_from([BINARY, "-c", "/nonexistent-ppsntp/ppsntp.toml"])
            .unwrap()
            .into_config();
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
