//! Kernel i2c-dev transport: one open `/dev/i2c-N` file bound to one slave
//! address.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use sereader_api::{Error, I2cBus, I2cSpec};

// from include/uapi/linux/i2c-dev.h
const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_FUNCS: libc::c_ulong = 0x0705;

bitflags::bitflags! {
    /// Adapter functionality word returned by `I2C_FUNCS`
    /// (include/uapi/linux/i2c.h).
    pub struct I2cFuncs: u64 {
        const I2C = 0x0000_0001;
        const TENBIT_ADDR = 0x0000_0002;
        const PROTOCOL_MANGLING = 0x0000_0004;
        const SMBUS_PEC = 0x0000_0008;
    }
}

pub struct KernelI2c {
    file: File,
    addr: u16,
}

impl KernelI2c {
    /// Opens the character device, checks that the adapter does plain I²C
    /// transfers, and binds the 7-bit slave address.
    pub fn open(path: &str, addr: u16) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(|e| {
            log::error!("{}: {}", path, e);
            Error::NoDevice
        })?;

        let mut funcs: libc::c_ulong = 0;
        if unsafe { libc::ioctl(file.as_raw_fd(), I2C_FUNCS as _, &mut funcs) } < 0 {
            log::error!("{}: I2C_FUNCS: {}", path, std::io::Error::last_os_error());
            return Err(Error::NoDevice);
        }
        let funcs = I2cFuncs::from_bits_truncate(funcs as u64);
        if !funcs.contains(I2cFuncs::I2C) {
            log::error!("{}: adapter lacks plain I2C transfers ({:#x})", path, funcs.bits());
            return Err(Error::NoDevice);
        }

        if unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(addr)) } < 0 {
            log::error!("{}: I2C_SLAVE {:#04x}: {}", path, addr, std::io::Error::last_os_error());
            return Err(Error::NoDevice);
        }

        log::debug!("{} bound to slave {:#04x}", path, addr);
        Ok(KernelI2c { file, addr })
    }

    pub fn addr(&self) -> u16 {
        self.addr
    }
}

/// ENXIO, ETIMEDOUT and EREMOTEIO all mean "slave not ready"; which one a
/// given adapter driver raises varies, so all three collapse to a NACK.
fn map_io_error(e: &std::io::Error) -> Error {
    match e.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::ETIMEDOUT) | Some(libc::EREMOTEIO) => Error::Nack,
        _ => Error::Transport,
    }
}

impl I2cBus for KernelI2c {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        match self.file.read(buf) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => {
                log::error!("short read from {:#04x}: {} of {}", self.addr, n, buf.len());
                Err(Error::Transport)
            }
            Err(e) => {
                let mapped = map_io_error(&e);
                if mapped != Error::Nack {
                    log::error!("read from {:#04x}: {}", self.addr, e);
                }
                Err(mapped)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.file.write(data) {
            Ok(n) if n == data.len() => Ok(()),
            Ok(n) => {
                log::error!("short write to {:#04x}: {} of {}", self.addr, n, data.len());
                Err(Error::Transport)
            }
            Err(e) => {
                let mapped = map_io_error(&e);
                if mapped != Error::Nack {
                    log::error!("write to {:#04x}: {}", self.addr, e);
                }
                Err(mapped)
            }
        }
    }
}

pub fn open_bus(spec: &I2cSpec) -> Result<Box<dyn I2cBus>, Error> {
    match spec {
        I2cSpec::Kernel { path, addr } => Ok(Box::new(KernelI2c::open(path, *addr)?)),
    }
}
