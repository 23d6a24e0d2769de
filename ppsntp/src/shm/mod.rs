//! Publication of samples through the NTP shared memory reference clock
//! protocol
//!
//! The consuming time daemon polls a small fixed-layout segment. This crate
//! only ever uses mode 0 of that protocol: the writer clears `valid`, fills
//! in every field and sets `valid` again. The reader takes a sample only
//! while `valid` is set and clears it after reading. There is no queue; a
//! sample that is not read before the next publication is overwritten.
//!
//! The layout of the segment itself is platform specific and lives behind
//! the [`TimeExchange`] trait.

use core::sync::atomic::{fence, Ordering};

use crate::time::Timestamp;

/// Protocol mode written to every sample: plain `valid` flag handshake,
/// without the `count` consistency check of mode 1.
pub const MODE_SIMPLE: i32 = 0;

/// Precision written to every sample, as log2 seconds. Whole seconds.
pub const PRECISION_ONE_SECOND: i32 = 0;

/// Leap indicator written to every sample: no warning.
pub const LEAP_NO_WARNING: i32 = 0;

/// Field level access to a single time exchange segment.
///
/// Implementations must perform every access as a volatile access on the
/// shared memory, so that none of them is elided or merged. Ordering between
/// the accesses is taken care of by [`ShmPublisher`].
pub trait TimeExchange {
    /// Read the `valid` flag
    fn is_valid(&self) -> bool;

    /// Write the `valid` flag
    fn set_valid(&mut self, valid: bool);

    /// Write the receive timestamp: local time at which the edge was seen
    fn set_receive(&mut self, seconds: i64, micros: i32);

    /// Write the clock timestamp: the time the edge represents
    fn set_clock(&mut self, seconds: i64, micros: i32);

    /// Write the `mode`, `count`, `leap` and `precision` fields
    fn set_metadata(&mut self, mode: i32, count: i32, leap: i32, precision: i32);
}

/// Sole writer of a time exchange segment
#[derive(Debug)]
pub struct ShmPublisher<T> {
    segment: T,
    published: u64,
    retrieved: u64,
}

impl<T: TimeExchange> ShmPublisher<T> {
    pub fn new(segment: T) -> Self {
        Self {
            segment,
            published: 0,
            retrieved: 0,
        }
    }

    /// Replace the sample in the segment.
    ///
    /// `receive` is published with microsecond resolution, `clock` as a
    /// whole second.
    pub fn publish(&mut self, receive: Timestamp, clock: Timestamp) {
        self.note_retrieval();
        self.segment.set_valid(false);
        fence(Ordering::SeqCst);

        self.segment
            .set_receive(receive.seconds, receive.micros() as i32);
        self.segment.set_clock(clock.seconds, 0);
        self.segment.set_metadata(
            MODE_SIMPLE,
            0,
            LEAP_NO_WARNING,
            PRECISION_ONE_SECOND,
        );

        fence(Ordering::SeqCst);
        self.segment.set_valid(true);
        self.published += 1;
    }

    /// Withdraw the current sample without writing a new one
    pub fn invalidate(&mut self) {
        self.note_retrieval();
        self.segment.set_valid(false);
        fence(Ordering::SeqCst);
    }

    /// Number of samples published so far
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Number of times the `valid` flag was found cleared right before
    /// writing, i.e. the reader consumed the previous sample. A freshly
    /// created segment also counts once.
    pub fn retrieved(&self) -> u64 {
        self.retrieved
    }

    pub fn segment(&self) -> &T {
        &self.segment
    }

    fn note_retrieval(&mut self) {
        if !self.segment.is_valid() {
            self.retrieved += 1;
        }
    }
}
