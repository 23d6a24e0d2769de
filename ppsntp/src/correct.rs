//! Applying the fudge to a capture and deciding which second it marks

use crate::time::{Fudge, Timestamp, HALF_SECOND_NANOS};

/// Result of correcting a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    /// The local time at which the edge was observed, with the fudge applied.
    /// Published as the receive timestamp.
    pub receive: Timestamp,
    /// The whole second the edge is taken to mark. The nanosecond part is
    /// always zero.
    pub clock: Timestamp,
    /// Whether the capture was moved into the following second
    pub wrapped: bool,
}

/// Turns raw captures into corrected samples and counts how often a capture
/// had to be moved into the next second.
///
/// A PPS edge nominally marks the instant a second turns over. Scheduling and
/// interrupt latency put the measured fraction on either side of that
/// boundary, so a capture that is half a second or more into a second is
/// taken to belong to the following one.
#[derive(Debug, Clone, Default)]
pub struct TimestampCorrector {
    wraps: u64,
}

impl TimestampCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of captures moved into the following second so far
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    pub fn correct(&mut self, raw: Timestamp, fudge: Fudge) -> Correction {
        let receive = fudge.apply(raw).normalized();

        let mut seconds = receive.seconds;
        let wrapped = receive.nanos >= HALF_SECOND_NANOS;
        if wrapped {
            seconds += 1;
            self.wraps += 1;
        }

        Correction {
            receive,
            clock: Timestamp::new(seconds, 0),
            wrapped,
        }
    }
}
