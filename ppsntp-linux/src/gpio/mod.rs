//! Implementation of the abstract PPS input and diagnostic output lines for
//! the linux platform

use std::{io, path::PathBuf, time::Duration};

use ppsntp::{
    time::{Timestamp, NANOS_PER_SECOND},
    EdgeMode, EdgeSource, OutputLine,
};
use thiserror::Error;

use crate::clock::RealtimeClock;

pub mod sysfs;

pub use sysfs::{Direction, Edge, SysfsGpio, DEFAULT_GPIO_ROOT};

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("could not access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected byte {0:#04x} in GPIO value file")]
    InvalidValue(u8),
    #[error("reading the clock failed: {0}")]
    Clock(#[source] io::Error),
}

/// Waits for edges by sleeping in `poll(2)` until the kernel reports an
/// interrupt on the line.
#[derive(Debug)]
pub struct InterruptEdgeSource {
    line: SysfsGpio,
}

impl InterruptEdgeSource {
    pub fn new(mut line: SysfsGpio, mode: EdgeMode) -> Result<Self, GpioError> {
        line.set_edge(match mode {
            EdgeMode::Rising => Edge::Rising,
            EdgeMode::Both => Edge::Both,
        })?;

        // clear the interrupt that may be pending from before
        line.read_level()?;

        tracing::info!("Using interrupts on GPIO {} ({mode:?})", line.pin());

        Ok(Self { line })
    }
}

impl EdgeSource for InterruptEdgeSource {
    type Error = GpioError;

    fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.line.wait_for_interrupt()
    }

    fn wait_for_either_edge(&mut self) -> Result<(), Self::Error> {
        self.line.wait_for_interrupt()
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        self.line.read_level()
    }
}

/// Waits for edges by repeatedly reading the line level, for hardware that
/// cannot raise interrupts on GPIO changes.
///
/// To not burn a CPU core continuously, every wait but the first starts by
/// sleeping for `idle_factor` of the time remaining until the next second.
/// After that sleep a rising edge is only reported once the line has been
/// seen low, so a pulse that is still high when a late capture wakes up
/// again is not captured twice.
#[derive(Debug)]
pub struct PollingEdgeSource {
    line: SysfsGpio,
    idle_factor: f64,
    idle_before_wait: bool,
}

impl PollingEdgeSource {
    pub fn new(mut line: SysfsGpio, idle_factor: f64) -> Result<Self, GpioError> {
        line.set_edge(Edge::None)?;

        tracing::info!(
            "Polling GPIO {}, idling {:.0}% of every second",
            line.pin(),
            idle_factor * 100.0
        );

        Ok(Self {
            line,
            idle_factor,
            idle_before_wait: false,
        })
    }

    /// Returns whether an earlier wait happened
    fn idle(&mut self) -> Result<bool, GpioError> {
        let idled = self.idle_before_wait;
        if idled {
            let now = RealtimeClock::get_time().map_err(GpioError::Clock)?;
            std::thread::sleep(idle_duration(now, self.idle_factor));
        }
        self.idle_before_wait = true;

        Ok(idled)
    }
}

/// Part of the remainder of the current second to sleep
pub fn idle_duration(now: Timestamp, idle_factor: f64) -> Duration {
    let remaining = (NANOS_PER_SECOND - now.nanos).max(0);
    Duration::from_nanos((remaining as f64 * idle_factor) as u64)
}

impl EdgeSource for PollingEdgeSource {
    type Error = GpioError;

    fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        if self.idle()? {
            while self.line.read_level()? {}
        }
        while !self.line.read_level()? {}

        Ok(())
    }

    fn wait_for_either_edge(&mut self) -> Result<(), Self::Error> {
        self.idle()?;
        let start = self.line.read_level()?;
        while self.line.read_level()? == start {}

        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        self.line.read_level()
    }

    fn captures_first_edge_reliably(&self) -> bool {
        false
    }
}

/// A line toggled once per pulse, for measuring latency with a scope
#[derive(Debug)]
pub struct SysfsOutputLine {
    line: SysfsGpio,
}

impl SysfsOutputLine {
    /// Claim the line as an output, initially low
    pub fn open(root: &std::path::Path, pin: u32) -> Result<Self, GpioError> {
        let line = SysfsGpio::open(root, pin, Direction::Output(false))?;
        tracing::info!("Toggling GPIO {pin} on every pulse");
        Ok(Self { line })
    }
}

impl OutputLine for SysfsOutputLine {
    type Error = GpioError;

    fn set_level(&mut self, high: bool) -> Result<(), Self::Error> {
        self.line.write_level(high)
    }
}
