//! Reader configuration strings.
//!
//! A reader is described by one string of `@`-separated tokens:
//!
//! ```text
//! i2c:kernel:/dev/i2c-1:0x48
//! i2c:kernel:/dev/i2c-1:72@gpio:kernel:0:n17
//! i2c:kernel:/dev/i2c-2:0x20@gpio:sysfs:507
//! ```
//!
//! The `i2c:` token is mandatory and comes first; the `gpio:` token is
//! optional. A leading `n` on a GPIO line number marks the line active-low.

use std::str::FromStr;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cSpec {
    /// Kernel character device plus a 7-bit slave address.
    Kernel { path: String, addr: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioSpec {
    /// A line on `/dev/gpiochip<chip>`, requested as output.
    Kernel { chip: u32, line: u32, active_low: bool },
    /// A legacy sysfs GPIO number.
    Sysfs { number: u32, active_low: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub i2c: I2cSpec,
    pub gpio: Option<GpioSpec>,
}

fn parse_number(s: &str) -> Result<u32, Error> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| Error::ParseError)
    } else {
        s.parse().map_err(|_| Error::ParseError)
    }
}

/// Strips an optional leading `n` (active-low marker) off a line number.
fn parse_line_number(s: &str) -> Result<(u32, bool), Error> {
    match s.strip_prefix('n') {
        Some(rest) => Ok((parse_number(rest)?, true)),
        None => Ok((parse_number(s)?, false)),
    }
}

fn parse_i2c(token: &str) -> Result<I2cSpec, Error> {
    let rest = token.strip_prefix("i2c:").ok_or(Error::ParseError)?;
    let rest = rest.strip_prefix("kernel:").ok_or(Error::ParseError)?;
    // The device path never contains ':', so the last field is the address.
    let (path, addr) = rest.rsplit_once(':').ok_or(Error::ParseError)?;
    if path.is_empty() {
        return Err(Error::ParseError);
    }
    let addr = parse_number(addr)?;
    if addr > 0x7F {
        return Err(Error::ParseError);
    }
    Ok(I2cSpec::Kernel { path: path.to_string(), addr: addr as u16 })
}

fn parse_gpio(token: &str) -> Result<GpioSpec, Error> {
    let rest = token.strip_prefix("gpio:").ok_or(Error::ParseError)?;
    if let Some(rest) = rest.strip_prefix("kernel:") {
        let (chip, line) = rest.split_once(':').ok_or(Error::ParseError)?;
        let chip = parse_number(chip)?;
        let (line, active_low) = parse_line_number(line)?;
        Ok(GpioSpec::Kernel { chip, line, active_low })
    } else if let Some(rest) = rest.strip_prefix("sysfs:") {
        let (number, active_low) = parse_line_number(rest)?;
        Ok(GpioSpec::Sysfs { number, active_low })
    } else {
        Err(Error::ParseError)
    }
}

impl FromStr for ReaderConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut tokens = s.split('@');
        let i2c = parse_i2c(tokens.next().ok_or(Error::ParseError)?)?;
        let gpio = match tokens.next() {
            Some(token) => Some(parse_gpio(token)?),
            None => None,
        };
        if tokens.next().is_some() {
            return Err(Error::ParseError);
        }
        Ok(ReaderConfig { i2c, gpio })
    }
}
