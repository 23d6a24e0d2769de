//! Serializable snapshot of the capture pipeline, to be used for
//! observability

use crate::time::{Fudge, Timestamp};

/// State of a [`CaptureLoop`](crate::CaptureLoop) after its most recent
/// cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct CaptureState {
    /// Fudge currently applied to captures
    pub fudge: Fudge,
    /// Whether the fudge is still being derived from observed offsets
    pub calibrating: bool,
    /// Pulses detected since startup
    pub pulses: u64,
    /// Samples handed to the time daemon
    pub published: u64,
    /// Captures moved into the following second
    pub wraps: u64,
    /// Times the time daemon was seen to have consumed a sample
    pub retrieved: u64,
    /// Receive timestamp of the most recent published sample
    pub last_receive: Option<Timestamp>,
    /// Clock second of the most recent published sample
    pub last_clock: Option<i64>,
}
