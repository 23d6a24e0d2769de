//! Definitions of the abstract PPS input line

/// Which transitions of the PPS line wake up the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EdgeMode {
    /// Only low to high transitions
    #[default]
    Rising,
    /// Both transitions; falling edges are filtered out after waking up by
    /// reading the line level. Useful for hardware that cannot deliver
    /// rising-only interrupts.
    Both,
}

/// Access to the GPIO line carrying the PPS signal.
///
/// The capture loop only calls these operations, it never configures the
/// underlying hardware. Acquiring the line is up to whoever constructs the
/// source.
///
/// None of the waits has a timeout: a stalled PPS signal stalls the caller.
pub trait EdgeSource {
    type Error: core::fmt::Debug;

    /// Block until the line transitions from low to high.
    ///
    /// A source that can only sample the level may return as soon as the
    /// level reads high.
    fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error>;

    /// Block until the line transitions in either direction
    fn wait_for_either_edge(&mut self) -> Result<(), Self::Error>;

    /// Read the instantaneous level of the line, `true` is high
    fn read_level(&mut self) -> Result<bool, Self::Error>;

    /// Whether the first wait of this source is guaranteed to end on an
    /// actual edge.
    ///
    /// A source that samples the level cannot tell a fresh edge from a line
    /// that was already high when it started looking, so the first capture
    /// it produces carries an arbitrary offset. The capture loop does not
    /// publish that capture when this returns `false`.
    fn captures_first_edge_reliably(&self) -> bool {
        true
    }
}
