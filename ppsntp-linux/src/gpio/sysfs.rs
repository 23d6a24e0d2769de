//! Access to a single GPIO line through the sysfs pseudo-device
//! (`/sys/class/gpio`)

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    time::Duration,
};

use super::GpioError;

/// Default mount point of the sysfs GPIO class
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long udev may take to make a freshly exported line usable
const EXPORT_SETTLE_ATTEMPTS: u32 = 20;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    /// Output, initially driven at the given level
    Output(bool),
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output(false) => "low",
            Direction::Output(true) => "high",
        }
    }
}

/// Which transitions raise an interrupt on the value file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Both,
}

impl Edge {
    fn as_str(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Both => "both",
        }
    }
}

/// An exported GPIO line with its value file held open
#[derive(Debug)]
pub struct SysfsGpio {
    pin: u32,
    dir: PathBuf,
    value: File,
}

impl SysfsGpio {
    /// Export `pin` below `root` if that has not happened yet, set its
    /// direction and open its value file.
    pub fn open(root: &Path, pin: u32, direction: Direction) -> Result<Self, GpioError> {
        let dir = root.join(format!("gpio{pin}"));

        if !dir.exists() {
            let export = root.join("export");
            write_attribute(&export, &pin.to_string())?;
        }

        // the attributes of a fresh export only become writable once udev
        // has processed it
        let direction_path = dir.join("direction");
        let mut attempt = 0;
        loop {
            match write_attribute(&direction_path, direction.as_str()) {
                Ok(()) => break,
                Err(GpioError::Io { source, .. })
                    if source.kind() == io::ErrorKind::PermissionDenied
                        || source.kind() == io::ErrorKind::NotFound =>
                {
                    attempt += 1;
                    if attempt >= EXPORT_SETTLE_ATTEMPTS {
                        return Err(GpioError::Io {
                            path: direction_path,
                            source,
                        });
                    }
                    std::thread::sleep(EXPORT_SETTLE_DELAY);
                }
                Err(error) => return Err(error),
            }
        }

        let value_path = dir.join("value");
        let value = OpenOptions::new()
            .read(true)
            .write(matches!(direction, Direction::Output(_)))
            .open(&value_path)
            .map_err(|source| GpioError::Io {
                path: value_path,
                source,
            })?;

        tracing::debug!("Opened GPIO {pin} as {}", direction.as_str());

        Ok(Self { pin, dir, value })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn set_edge(&mut self, edge: Edge) -> Result<(), GpioError> {
        write_attribute(&self.dir.join("edge"), edge.as_str())
    }

    pub fn read_level(&mut self) -> Result<bool, GpioError> {
        let mut buf = [0u8; 1];

        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.read_exact(&mut buf))
            .map_err(|source| self.value_error(source))?;

        match buf[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(GpioError::InvalidValue(other)),
        }
    }

    pub fn write_level(&mut self, high: bool) -> Result<(), GpioError> {
        let value: &[u8] = if high { b"1" } else { b"0" };

        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.write_all(value))
            .map_err(|source| self.value_error(source))
    }

    /// Block until the kernel signals an edge on the value file, as
    /// configured by [`set_edge`](Self::set_edge). No timeout.
    pub fn wait_for_interrupt(&mut self) -> Result<(), GpioError> {
        let mut poll_fd = libc::pollfd {
            fd: self.value.as_raw_fd(),
            events: libc::POLLPRI | libc::POLLERR,
            revents: 0,
        };

        loop {
            // SAFETY: poll_fd is a single valid pollfd
            let result = unsafe { libc::poll(&mut poll_fd, 1, -1) };
            if result >= 0 {
                break;
            }

            let error = io::Error::last_os_error();
            if error.kind() != io::ErrorKind::Interrupted {
                return Err(self.value_error(error));
            }
        }

        // reading the value acknowledges the interrupt
        self.read_level().map(|_| ())
    }

    fn value_error(&self, source: io::Error) -> GpioError {
        GpioError::Io {
            path: self.dir.join("value"),
            source,
        }
    }
}

fn write_attribute(path: &Path, value: &str) -> Result<(), GpioError> {
    std::fs::write(path, value).map_err(|source| GpioError::Io {
        path: path.to_owned(),
        source,
    })
}
