//! Process wide setup that reduces the latency between a PPS edge and the
//! moment it is timestamped

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// A failed setup operation, together with the OS error it produced.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct SetupError {
    pub operation: &'static str,
    #[source]
    pub source: io::Error,
}

impl SetupError {
    /// Capture `errno` for a failed `operation`
    pub fn last_os_error(operation: &'static str) -> Self {
        Self {
            operation,
            source: io::Error::last_os_error(),
        }
    }
}

fn check(operation: &'static str, result: libc::c_int) -> Result<(), SetupError> {
    if result == -1 {
        Err(SetupError::last_os_error(operation))
    } else {
        Ok(())
    }
}

/// Pages mapped now and pages mapped later both stay resident
const LOCK_FLAGS: libc::c_int = libc::MCL_CURRENT | libc::MCL_FUTURE;

/// Keep all pages of the process resident, so the capture path never waits
/// for a page fault.
///
/// Locks are not inherited by a forked child, so this has to run in the
/// process that ends up capturing.
pub fn lock_in_memory() -> Result<(), SetupError> {
    // SAFETY: plain syscall without pointer arguments
    check("mlockall(MCL_CURRENT | MCL_FUTURE)", unsafe {
        libc::mlockall(LOCK_FLAGS)
    })
}

/// The steps that turn the starting process into the one that captures,
/// after the devices have been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupStep {
    Daemonize,
    WritePidfile(PathBuf),
    LockMemory,
}

impl StartupStep {
    /// Steps in execution order. The pidfile records the pid of the forked
    /// child and the memory lock is taken last, in the child.
    pub fn plan(daemonize: bool, pidfile: Option<&Path>) -> Vec<StartupStep> {
        let mut steps = Vec::with_capacity(3);

        if daemonize {
            steps.push(StartupStep::Daemonize);
        }
        if let Some(path) = pidfile {
            steps.push(StartupStep::WritePidfile(path.to_owned()));
        }
        steps.push(StartupStep::LockMemory);

        steps
    }

    pub fn run(&self) -> Result<(), SetupError> {
        match self {
            StartupStep::Daemonize => daemonize(),
            StartupStep::WritePidfile(path) => write_pidfile(path),
            StartupStep::LockMemory => lock_in_memory(),
        }
    }
}

/// Give the process the highest niceness
pub fn set_nice() -> Result<(), SetupError> {
    // SAFETY: plain syscall without pointer arguments
    check("setpriority(-20)", unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, -20)
    })
}

/// Move the calling thread to the round robin real-time scheduling class at
/// the highest priority
pub fn set_realtime_priority() -> Result<(), SetupError> {
    set_scheduler(libc::SCHED_RR, "sched_setscheduler(SCHED_RR)")
}

/// Move the calling thread back to the default time sharing scheduler
pub fn set_normal_priority() -> Result<(), SetupError> {
    set_scheduler(libc::SCHED_OTHER, "sched_setscheduler(SCHED_OTHER)")
}

fn set_scheduler(policy: libc::c_int, operation: &'static str) -> Result<(), SetupError> {
    // SAFETY: plain syscall without pointer arguments
    let priority = unsafe { libc::sched_get_priority_max(policy) };
    check("sched_get_priority_max", priority)?;

    let param = libc::sched_param {
        sched_priority: priority,
    };

    // SAFETY: param is a valid sched_param for the duration of the call
    check(operation, unsafe { libc::sched_setscheduler(0, policy, &param) })
}

/// Detach from the controlling terminal and continue in the background.
///
/// Must be called before any thread is spawned; only the calling thread
/// survives.
pub fn daemonize() -> Result<(), SetupError> {
    // SAFETY: no other threads exist yet
    check("daemon", unsafe { libc::daemon(0, 0) })
}

pub fn write_pidfile(path: &Path) -> Result<(), SetupError> {
    std::fs::write(path, std::process::id().to_string()).map_err(|source| SetupError {
        operation: "writing pidfile",
        source,
    })
}
