//! SE05x session facade: lifecycle, power sequencing, resets, ATR and APDU
//! exchange over the block engine.

use sereader_api::{Error, GpioLine, I2cBus, ReaderConfig, SeReader};

use crate::atr::{self, AtrInfo};
use crate::bus::{sleep_ms, Timing, PWT_MS};
use crate::t1::T1Engine;
use crate::{gpio, i2cdev};

pub struct Se05xReader {
    engine: T1Engine,
    reset_line: Option<Box<dyn GpioLine>>,
    /// Raw ATR captured by the last warm reset.
    atr: Vec<u8>,
}

impl Se05xReader {
    /// Opens a session from a parsed configuration and brings the device to
    /// a known state: power off, settle, power on, warm reset.
    pub fn open(config: &ReaderConfig) -> Result<Self, Error> {
        let bus = i2cdev::open_bus(&config.i2c)?;
        let reset_line = config.gpio.as_ref().map(gpio::open_line).transpose()?;
        Self::from_parts(bus, reset_line, Timing::default())
    }

    /// Assembles a session over already-open handles; `open` and the tests
    /// (which substitute a scripted bus) both come through here.
    pub(crate) fn from_parts(
        bus: Box<dyn I2cBus>,
        reset_line: Option<Box<dyn GpioLine>>,
        timing: Timing,
    ) -> Result<Self, Error> {
        let mut reader = Se05xReader {
            engine: T1Engine::with_timing(bus, timing),
            reset_line,
            atr: Vec::new(),
        };
        reader.power_down()?;
        sleep_ms(PWT_MS);
        reader.power_up()?;
        reader.warm_reset()?;
        Ok(reader)
    }

    /// Releases the bus and GPIO handles. Dropping the reader does the
    /// same; this spelling exists for the explicit IFD close action.
    pub fn close(self) {}
}

impl SeReader for Se05xReader {
    fn power_up(&mut self) -> Result<(), Error> {
        match self.reset_line.as_mut() {
            Some(line) => line.enable()?,
            // no reset line wired: a full chip reset does the power action
            None => self.engine.chip_reset()?,
        }
        self.engine.reset_state();
        sleep_ms(PWT_MS);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Error> {
        if let Some(line) = self.reset_line.as_mut() {
            line.disable()?;
        }
        Ok(())
    }

    fn warm_reset(&mut self) -> Result<(), Error> {
        self.engine.reset_state();
        self.atr = self.engine.soft_reset()?;
        log::debug!("ATR: {:02x?}", self.atr);
        // a parseable ATR replaces the power-on timing defaults
        match AtrInfo::parse(&self.atr) {
            Some(info) => self.engine.set_timing(info.timing()),
            None => log::debug!("ATR not parseable, keeping default timing"),
        }
        Ok(())
    }

    fn atr(&self, buf: &mut [u8]) -> Result<usize, Error> {
        atr::rewrite(&self.atr, buf)
    }

    fn transmit(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error> {
        self.engine.transceive(tx, rx)
    }
}
