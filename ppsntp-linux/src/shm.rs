//! System V shared memory segment of the NTP SHM reference clock driver

use std::{
    io,
    ptr::{addr_of, addr_of_mut, NonNull},
};

use libc::{c_int, time_t};
use ppsntp::TimeExchange;

use crate::setup::SetupError;

/// Key of unit 0; unit `n` lives at `NTP_SHM_KEY + n`. Reads "NTP0".
pub const NTP_SHM_KEY: libc::key_t = 0x4e54_5030;

/// Highest unit number understood by the time daemons
pub const MAX_UNIT: u8 = 3;

/// Memory layout of a segment, as defined by ntpd's `refclock_shm`
#[repr(C)]
#[derive(Debug, Default)]
pub struct ShmTime {
    pub mode: c_int,
    pub count: c_int,
    pub clock_time_stamp_sec: time_t,
    pub clock_time_stamp_usec: c_int,
    pub receive_time_stamp_sec: time_t,
    pub receive_time_stamp_usec: c_int,
    pub leap: c_int,
    pub precision: c_int,
    pub nsamples: c_int,
    pub valid: c_int,
    pub dummy: [c_int; 10],
}

/// An attached segment. It stays attached for the lifetime of the process.
#[derive(Debug)]
pub struct SysvSegment {
    shm: NonNull<ShmTime>,
}

impl SysvSegment {
    /// Create (if needed) and attach the segment for `unit`.
    ///
    /// Units 0 and 1 are only accessible by root, higher units by everyone,
    /// like ntpd creates them.
    pub fn attach(unit: u8) -> Result<Self, SetupError> {
        let key = NTP_SHM_KEY + unit as libc::key_t;
        let permissions = if unit < 2 { 0o600 } else { 0o666 };

        // SAFETY: plain syscall without pointer arguments
        let id = unsafe {
            libc::shmget(
                key,
                std::mem::size_of::<ShmTime>(),
                libc::IPC_CREAT | permissions,
            )
        };
        if id == -1 {
            return Err(SetupError::last_os_error("shmget"));
        }

        // SAFETY: id refers to an existing segment, the kernel picks the address
        let address = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if address as isize == -1 {
            return Err(SetupError::last_os_error("shmat"));
        }

        let shm = NonNull::new(address.cast::<ShmTime>()).ok_or_else(|| SetupError {
            operation: "shmat",
            source: io::Error::from(io::ErrorKind::InvalidData),
        })?;

        tracing::info!("Attached NTP shared memory unit {unit} (key {key:#x})");

        Ok(Self { shm })
    }

    /// Use memory that is not a System V segment, e.g. for tests
    ///
    /// # Safety
    /// `shm` must stay valid for reads and writes for the lifetime of the
    /// returned value and must not be accessed through other references in
    /// the meantime.
    pub unsafe fn from_raw(shm: NonNull<ShmTime>) -> Self {
        Self { shm }
    }
}

impl TimeExchange for SysvSegment {
    fn is_valid(&self) -> bool {
        // SAFETY: shm points to an attached segment
        unsafe { addr_of!((*self.shm.as_ptr()).valid).read_volatile() != 0 }
    }

    fn set_valid(&mut self, valid: bool) {
        // SAFETY: shm points to an attached segment
        unsafe { addr_of_mut!((*self.shm.as_ptr()).valid).write_volatile(valid as c_int) }
    }

    fn set_receive(&mut self, seconds: i64, micros: i32) {
        let shm = self.shm.as_ptr();
        // SAFETY: shm points to an attached segment
        unsafe {
            addr_of_mut!((*shm).receive_time_stamp_sec).write_volatile(seconds as time_t);
            addr_of_mut!((*shm).receive_time_stamp_usec).write_volatile(micros as c_int);
        }
    }

    fn set_clock(&mut self, seconds: i64, micros: i32) {
        let shm = self.shm.as_ptr();
        // SAFETY: shm points to an attached segment
        unsafe {
            addr_of_mut!((*shm).clock_time_stamp_sec).write_volatile(seconds as time_t);
            addr_of_mut!((*shm).clock_time_stamp_usec).write_volatile(micros as c_int);
        }
    }

    fn set_metadata(&mut self, mode: i32, count: i32, leap: i32, precision: i32) {
        let shm = self.shm.as_ptr();
        // SAFETY: shm points to an attached segment
        unsafe {
            addr_of_mut!((*shm).leap).write_volatile(leap as c_int);
            addr_of_mut!((*shm).mode).write_volatile(mode as c_int);
            addr_of_mut!((*shm).count).write_volatile(count as c_int);
            addr_of_mut!((*shm).precision).write_volatile(precision as c_int);
        }
    }
}
