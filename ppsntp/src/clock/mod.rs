//! Definitions of the abstract clock type

use crate::time::Timestamp;

/// Wall clock used to timestamp detected edges.
///
/// The implementation should be provided by the user of the `ppsntp` crate
/// and read the same realtime clock the consuming time daemon disciplines.
/// An implementation for linux is provided in the `ppsntp-linux` crate.
pub trait Clock {
    type Error: core::fmt::Debug;

    /// Get the current time of the clock.
    ///
    /// The returned nanoseconds must lie in `0..1_000_000_000`.
    fn now(&mut self) -> Result<Timestamp, Self::Error>;
}
