use core::fmt::{Display, Formatter};

use super::{Timestamp, NANOS_PER_SECOND};

/// An additive correction applied to every captured timestamp to compensate
/// for systematic measurement bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fudge {
    pub seconds: i64,
    pub nanos: i64,
}

impl Fudge {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(seconds: i64, nanos: i64) -> Self {
        Self { seconds, nanos }
    }

    /// Split a user supplied offset in microseconds. Both parts truncate
    /// toward zero and carry the sign of `micros`.
    ///
    /// ```
    /// # use ppsntp::time::Fudge;
    /// assert_eq!(Fudge::from_micros(1_500_000), Fudge::new(1, 500_000_000));
    /// assert_eq!(Fudge::from_micros(-250), Fudge::new(0, -250_000));
    /// ```
    pub const fn from_micros(micros: i64) -> Self {
        Self::new(micros / 1_000_000, (micros % 1_000_000) * 1000)
    }

    /// The fudge that cancels an average observed offset of
    /// `average_nanos`.
    pub const fn cancelling(average_nanos: i64) -> Self {
        Self::new(
            -(average_nanos / NANOS_PER_SECOND),
            -(average_nanos % NANOS_PER_SECOND),
        )
    }

    /// Add this fudge to `timestamp`, without normalizing the result
    pub const fn apply(&self, timestamp: Timestamp) -> Timestamp {
        Timestamp::new(
            timestamp.seconds + self.seconds,
            timestamp.nanos + self.nanos,
        )
    }

    pub const fn total_nanos(&self) -> i64 {
        self.seconds * NANOS_PER_SECOND + self.nanos
    }
}

impl Display for Fudge {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ns", self.total_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_negates_average() {
        assert_eq!(Fudge::cancelling(200_000_000), Fudge::new(0, -200_000_000));
        assert_eq!(
            Fudge::cancelling(1_300_000_000),
            Fudge::new(-1, -300_000_000)
        );
        assert_eq!(Fudge::cancelling(-5), Fudge::new(0, 5));
    }

    #[test]
    fn apply_does_not_normalize() {
        let fudge = Fudge::new(0, 700_000_000);
        assert_eq!(
            fudge.apply(Timestamp::new(10, 600_000_000)),
            Timestamp::new(10, 1_300_000_000)
        );
    }

    #[test]
    fn micros_roundtrip_total() {
        assert_eq!(Fudge::from_micros(-1_000_001).total_nanos(), -1_000_001_000);
    }
}
