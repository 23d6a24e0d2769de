//! Types that describe captured points in time ([`Timestamp`]) and the
//! correction that is applied to them ([`Fudge`])
//!
//! These are used throughout `ppsntp` instead of types from [`core::time`] as
//! they keep a signed nanosecond component, which is what the correction
//! arithmetic works with.

mod fudge;
mod timestamp;

pub use fudge::Fudge;
pub use timestamp::Timestamp;

/// Number of nanoseconds in one second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Number of nanoseconds in half a second, the point at which a capture is
/// considered to belong to the next second
pub const HALF_SECOND_NANOS: i64 = NANOS_PER_SECOND / 2;
