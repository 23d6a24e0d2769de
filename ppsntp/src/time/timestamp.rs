use core::fmt::{Display, Formatter};

use super::{HALF_SECOND_NANOS, NANOS_PER_SECOND};

/// A point in time as whole seconds since the unix epoch plus a nanosecond
/// part.
///
/// The nanosecond part is signed so a timestamp can temporarily hold a value
/// outside of `0..1_000_000_000` while a correction is being applied. Use
/// [`Timestamp::normalized`] to bring it back into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i64,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: i64) -> Self {
        Self { seconds, nanos }
    }

    /// Carry or borrow one second so that `nanos` ends up in
    /// `0..1_000_000_000`.
    ///
    /// Only a single second is moved, which is enough for any timestamp
    /// produced by adding a normalized fudge to a normalized capture.
    ///
    /// ```
    /// # use ppsntp::time::Timestamp;
    /// assert_eq!(Timestamp::new(10, 1_200_000_000).normalized(), Timestamp::new(11, 200_000_000));
    /// assert_eq!(Timestamp::new(10, -100_000_000).normalized(), Timestamp::new(9, 900_000_000));
    /// ```
    pub const fn normalized(self) -> Self {
        if self.nanos >= NANOS_PER_SECOND {
            Self::new(self.seconds + 1, self.nanos - NANOS_PER_SECOND)
        } else if self.nanos < 0 {
            Self::new(self.seconds - 1, self.nanos + NANOS_PER_SECOND)
        } else {
            self
        }
    }

    /// The microsecond part, truncated
    pub const fn micros(&self) -> i64 {
        self.nanos / 1000
    }

    /// Distance in nanoseconds to the nearest second boundary, negative when
    /// the timestamp lies in the second half of a second (i.e. before the
    /// next boundary).
    ///
    /// ```
    /// # use ppsntp::time::Timestamp;
    /// assert_eq!(Timestamp::new(7, 250_000_000).signed_subsecond_nanos(), 250_000_000);
    /// assert_eq!(Timestamp::new(7, 750_000_000).signed_subsecond_nanos(), -250_000_000);
    /// ```
    pub const fn signed_subsecond_nanos(&self) -> i64 {
        if self.nanos >= HALF_SECOND_NANOS {
            -(NANOS_PER_SECOND - self.nanos)
        } else {
            self.nanos
        }
    }

    /// [`signed_subsecond_nanos`](Self::signed_subsecond_nanos) in seconds
    pub fn signed_subsecond(&self) -> f64 {
        self.signed_subsecond_nanos() as f64 / NANOS_PER_SECOND as f64
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}
