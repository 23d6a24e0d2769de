//! `ppsntp` turns a hardware pulse-per-second (PPS) signal into time samples
//! for an NTP daemon. Every detected pulse is timestamped against the local
//! system clock, corrected with a learned offset (the "fudge") and published
//! into the fixed-layout shared memory segment that `ntpd`/`chronyd` poll
//! through their SHM reference clock driver.
//!
//! # Device interfaces
//! `ppsntp` is designed to run on many different underlying platforms. It
//! does not know how to read a GPIO line, read the system clock or attach a
//! shared memory segment; that needs to be provided by the user of the
//! library through the [`EdgeSource`], [`Clock`], [`TimeExchange`] and
//! [`OutputLine`] traits.
//!
//! On linux the `ppsntp-linux` crate provides ready to use implementations of
//! these interfaces, together with the `ppsntp` daemon.
//!
//! # Pipeline
//! The [`CaptureLoop`] drives one pulse at a time through the components:
//!
//! * [`EdgeSource`] blocks until the PPS line goes high
//! * [`Clock`] timestamps the edge
//! * [`FudgeCalibrator`] learns the fudge from the first samples (optional)
//! * [`TimestampCorrector`] applies the fudge and decides which second the
//!   edge belongs to
//! * [`ShmPublisher`] hands the sample to the time daemon
//! * [`OutputPulser`] and [`DebugStatsTracker`] provide diagnostics

#![no_std]

#[cfg(feature = "std")]
extern crate std;

mod calibrate;
mod capture;
mod clock;
pub mod config;
mod correct;
mod edge;
pub mod observability;
mod output;
pub mod shm;
mod stats;
pub mod time;

pub use calibrate::FudgeCalibrator;
pub use capture::{CaptureError, CaptureLoop, CycleOutcome};
pub use clock::Clock;
pub use correct::{Correction, TimestampCorrector};
pub use edge::{EdgeMode, EdgeSource};
pub use output::{OutputLine, OutputPulser};
pub use shm::{ShmPublisher, TimeExchange};
pub use stats::{DebugStatsTracker, StatsReport};
