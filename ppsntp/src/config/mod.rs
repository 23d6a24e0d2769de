//! Configuration of the capture pipeline

use crate::{edge::EdgeMode, time::Fudge};

/// The part of the daemon configuration the capture pipeline acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Fudge applied from the start, and kept when rebasing is disabled
    pub fudge: Fudge,
    /// Which line transitions wake up the capture loop
    pub edge_mode: EdgeMode,
    /// Number of initial samples averaged into a new fudge; zero or less
    /// disables rebasing
    pub rebase_count: i64,
    /// Track and log per-pulse statistics
    pub debug: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fudge: Fudge::ZERO,
            edge_mode: EdgeMode::Rising,
            rebase_count: -1,
            debug: false,
        }
    }
}
