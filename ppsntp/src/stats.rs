//! Running statistics over observed offsets, for human consumption only

use core::fmt::{Display, Formatter};

use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bucket {
    sum: f64,
    count: u64,
}

impl Bucket {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Tracks the mean of the signed sub-second offsets of all pulses, plus the
/// mean of the offsets that fell below and at-or-above the running mean.
///
/// A sample is sorted into a bucket by comparing it to the mean of the
/// samples before it; the very first sample has no mean to compare to and
/// only counts towards the overall mean.
#[derive(Debug, Clone, Default)]
pub struct DebugStatsTracker {
    overall: Bucket,
    below: Bucket,
    above: Bucket,
    last_offset: f64,
}

impl DebugStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the signed offset (in seconds) of a pulse to the nearest
    /// second boundary
    pub fn record(&mut self, offset: f64) {
        if let Some(mean) = self.overall.average() {
            if offset < mean {
                self.below.add(offset);
            } else {
                self.above.add(offset);
            }
        }

        self.overall.add(offset);
        self.last_offset = offset;
    }

    pub fn samples(&self) -> u64 {
        self.overall.count
    }

    pub fn mean(&self) -> Option<f64> {
        self.overall.average()
    }

    pub fn below_mean(&self) -> Option<f64> {
        self.below.average()
    }

    pub fn above_mean(&self) -> Option<f64> {
        self.above.average()
    }

    /// Percentage of recorded samples that were moved into the next second
    pub fn wrap_percentage(&self, wraps: u64) -> f64 {
        match self.overall.count {
            0 => 0.0,
            total => wraps as f64 * 100.0 / total as f64,
        }
    }

    /// Summarize the state after the most recent [`record`](Self::record)
    pub fn report(&self, timestamp: Timestamp, wraps: u64, retrieved: u64) -> StatsReport {
        StatsReport {
            timestamp,
            index: self.overall.count,
            wrap_percentage: self.wrap_percentage(wraps),
            retrieved,
            offset: self.last_offset,
            below_mean: self.below_mean(),
            mean: self.mean(),
            above_mean: self.above_mean(),
        }
    }
}

/// One line of debug output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub timestamp: Timestamp,
    pub index: u64,
    pub wrap_percentage: f64,
    pub retrieved: u64,
    pub offset: f64,
    pub below_mean: Option<f64>,
    pub mean: Option<f64>,
    pub above_mean: Option<f64>,
}

struct Average(Option<f64>);

impl Display for Average {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.6}"),
            None => f.write_str("-"),
        }
    }
}

impl Display for StatsReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}] pulse #{}, {:.2}% wraps, {} retrieved, offset {:.6}s {}/{}/{}",
            self.timestamp,
            self.index,
            self.wrap_percentage,
            self.retrieved,
            self.offset,
            Average(self.below_mean),
            Average(self.mean),
            Average(self.above_mean),
        )
    }
}
