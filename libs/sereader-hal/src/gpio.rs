//! Reset/power lines: gpiochip character-device lines and legacy sysfs
//! GPIOs. Active-low wiring is absorbed here; callers only see the logical
//! enable/disable.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::Path;

use sereader_api::{Error, GpioLine, GpioSpec};

// from include/uapi/linux/gpio.h
const GPIOHANDLES_MAX: usize = 64;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;
const GPIOHANDLE_REQUEST_ACTIVE_LOW: u32 = 1 << 2;
const GPIO_GET_LINEHANDLE_IOCTL: libc::c_ulong = 0xC16C_B403;
const GPIOHANDLE_SET_LINE_VALUES_IOCTL: libc::c_ulong = 0xC040_B409;

#[repr(C)]
struct GpioHandleRequest {
    lineoffsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; 32],
    lines: u32,
    fd: libc::c_int,
}

#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

/// One output line requested from `/dev/gpiochipN`.
pub struct CdevGpio {
    handle: File,
}

impl CdevGpio {
    pub fn open(chip: u32, line: u32, active_low: bool) -> Result<Self, Error> {
        let path = format!("/dev/gpiochip{}", chip);
        let chip_file = OpenOptions::new().read(true).write(true).open(&path).map_err(|e| {
            log::error!("{}: {}", path, e);
            Error::NoDevice
        })?;

        let mut req = GpioHandleRequest {
            lineoffsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_OUTPUT
                | if active_low { GPIOHANDLE_REQUEST_ACTIVE_LOW } else { 0 },
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; 32],
            lines: 1,
            fd: -1,
        };
        req.lineoffsets[0] = line;
        let label = b"sereader";
        req.consumer_label[..label.len()].copy_from_slice(label);

        if unsafe { libc::ioctl(chip_file.as_raw_fd(), GPIO_GET_LINEHANDLE_IOCTL as _, &mut req) }
            < 0
            || req.fd < 0
        {
            log::error!("{} line {}: {}", path, line, std::io::Error::last_os_error());
            return Err(Error::NoDevice);
        }
        // The chip fd is only needed to issue the request; the line handle
        // keeps the line reserved from here on.
        Ok(CdevGpio { handle: unsafe { File::from_raw_fd(req.fd) } })
    }

    fn set(&mut self, value: u8) -> Result<(), Error> {
        let mut data = GpioHandleData { values: [0; GPIOHANDLES_MAX] };
        data.values[0] = value;
        if unsafe {
            libc::ioctl(self.handle.as_raw_fd(), GPIOHANDLE_SET_LINE_VALUES_IOCTL as _, &mut data)
        } < 0
        {
            log::error!("set line value: {}", std::io::Error::last_os_error());
            return Err(Error::Transport);
        }
        Ok(())
    }
}

impl GpioLine for CdevGpio {
    fn enable(&mut self) -> Result<(), Error> {
        self.set(1)
    }

    fn disable(&mut self) -> Result<(), Error> {
        self.set(0)
    }
}

/// A sysfs GPIO, exported on open and unexported on drop. The `value` file
/// descriptor is held open across the session.
pub struct SysfsGpio {
    number: u32,
    value: File,
}

const SYSFS_ROOT: &str = "/sys/class/gpio";

impl SysfsGpio {
    pub fn open(number: u32, active_low: bool) -> Result<Self, Error> {
        let dir = format!("{}/gpio{}", SYSFS_ROOT, number);
        if !Path::new(&dir).exists() {
            sysfs_write(&format!("{}/export", SYSFS_ROOT), &number.to_string())?;
        }
        sysfs_write(&format!("{}/active_low", dir), if active_low { "1" } else { "0" })?;
        sysfs_write(&format!("{}/direction", dir), "out")?;
        let value = OpenOptions::new().write(true).open(format!("{}/value", dir)).map_err(|e| {
            log::error!("gpio{} value: {}", number, e);
            Error::NoDevice
        })?;
        Ok(SysfsGpio { number, value })
    }

    fn set(&mut self, value: &[u8]) -> Result<(), Error> {
        self.value.seek(SeekFrom::Start(0)).map_err(|_| Error::Transport)?;
        self.value.write_all(value).map_err(|e| {
            log::error!("gpio{}: {}", self.number, e);
            Error::Transport
        })
    }
}

fn sysfs_write(path: &str, contents: &str) -> Result<(), Error> {
    fs::write(path, contents).map_err(|e| {
        log::error!("{}: {}", path, e);
        Error::NoDevice
    })
}

impl GpioLine for SysfsGpio {
    fn enable(&mut self) -> Result<(), Error> {
        self.set(b"1")
    }

    fn disable(&mut self) -> Result<(), Error> {
        self.set(b"0")
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        let _ = fs::write(format!("{}/unexport", SYSFS_ROOT), self.number.to_string());
    }
}

pub fn open_line(spec: &GpioSpec) -> Result<Box<dyn GpioLine>, Error> {
    match *spec {
        GpioSpec::Kernel { chip, line, active_low } => {
            Ok(Box::new(CdevGpio::open(chip, line, active_low)?))
        }
        GpioSpec::Sysfs { number, active_low } => {
            Ok(Box::new(SysfsGpio::open(number, active_low)?))
        }
    }
}
