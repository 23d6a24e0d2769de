//! Implementation of the abstract clock for the linux platform

use std::io;

use ppsntp::{time::Timestamp, Clock};

/// The system wide realtime clock, `CLOCK_REALTIME`. This is the clock the
/// consuming NTP daemon disciplines.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClock;

impl RealtimeClock {
    pub fn get_time() -> io::Result<Timestamp> {
        let mut spec = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // SAFETY: spec is a valid, writable timespec
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut spec) } == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(timespec_into_timestamp(spec))
    }
}

impl Clock for RealtimeClock {
    type Error = io::Error;

    fn now(&mut self) -> Result<Timestamp, Self::Error> {
        Self::get_time()
    }
}

pub fn timespec_into_timestamp(spec: libc::timespec) -> Timestamp {
    Timestamp::new(spec.tv_sec as i64, spec.tv_nsec as i64)
}
