//! Kerkey driver: a bare length-prefixed exchange, no block framing.
//!
//! The device answers every command with a 2-byte big-endian header
//! followed by the payload. Only the low 8 bits of the header count as
//! payload length; discarding the upper bits is the device's wire contract,
//! not a driver shortcut.

use sereader_api::{Error, GpioLine, I2cBus, ReaderConfig, SeReader};

use crate::bus::{sleep_ms, I2cBusExt, Timing};
use crate::{gpio, i2cdev};

/// Settle time around power cycling.
const POWER_SETTLE_MS: u64 = 200;

const LEN_MASK: u16 = 0x00FF;

pub struct KerkeyReader {
    bus: Box<dyn I2cBus>,
    reset_line: Option<Box<dyn GpioLine>>,
    timing: Timing,
    atr: Vec<u8>,
}

impl KerkeyReader {
    pub fn open(config: &ReaderConfig) -> Result<Self, Error> {
        let bus = i2cdev::open_bus(&config.i2c)?;
        let reset_line = config.gpio.as_ref().map(gpio::open_line).transpose()?;
        Self::from_parts(bus, reset_line, Timing::default())
    }

    pub(crate) fn from_parts(
        bus: Box<dyn I2cBus>,
        reset_line: Option<Box<dyn GpioLine>>,
        timing: Timing,
    ) -> Result<Self, Error> {
        let mut reader = KerkeyReader { bus, reset_line, timing, atr: Vec::new() };
        reader.power_up()?;
        Ok(reader)
    }

    /// Releases the bus and GPIO handles; the IFD close action.
    pub fn close(self) {}

    /// Reads one length-prefixed message, polling until the device serves
    /// the header.
    fn read_message(&mut self) -> Result<Vec<u8>, Error> {
        let mut header = [0u8; 2];
        self.bus.read_retry(&mut header, &self.timing)?;
        let len = (u16::from_be_bytes(header) & LEN_MASK) as usize;
        let mut payload = vec![0u8; len];
        if len > 0 {
            self.bus.read_retry(&mut payload, &self.timing)?;
        }
        Ok(payload)
    }
}

impl SeReader for KerkeyReader {
    /// Powering up also re-captures the ATR the device presents after
    /// reset.
    fn power_up(&mut self) -> Result<(), Error> {
        if let Some(line) = self.reset_line.as_mut() {
            line.enable()?;
        }
        sleep_ms(POWER_SETTLE_MS);
        self.atr = self.read_message()?;
        log::debug!("Kerkey ATR: {:02x?}", self.atr);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Error> {
        if let Some(line) = self.reset_line.as_mut() {
            line.disable()?;
            sleep_ms(POWER_SETTLE_MS);
        }
        Ok(())
    }

    fn warm_reset(&mut self) -> Result<(), Error> {
        self.power_down()?;
        self.power_up()
    }

    /// The Kerkey ATR is already conformant; it is served straight from the
    /// cache.
    fn atr(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.len() < self.atr.len() {
            return Err(Error::BufferTooSmall);
        }
        buf[..self.atr.len()].copy_from_slice(&self.atr);
        Ok(self.atr.len())
    }

    fn transmit(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error> {
        if tx.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.bus.write_retry(tx, &self.timing)?;
        let msg = self.read_message()?;
        let take = msg.len().min(rx.len());
        if take < msg.len() {
            log::warn!("response exceeds the {}-byte buffer, truncating", rx.len());
        }
        rx[..take].copy_from_slice(&msg[..take]);
        Ok(take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_timing, MockBus, MockLine};

    fn open_kerkey(bus: &MockBus) -> (KerkeyReader, MockLine) {
        let line = MockLine::new();
        let reader = KerkeyReader::from_parts(
            Box::new(bus.clone()),
            Some(Box::new(line.clone())),
            test_timing(),
        )
        .unwrap();
        (reader, line)
    }

    #[test]
    fn open_powers_up_and_reads_atr() {
        let bus = MockBus::new();
        bus.push_raw(&[0x00, 0x04, 0x3B, 0x01, 0x02, 0x03]);
        let (reader, line) = open_kerkey(&bus);
        assert_eq!(line.events(), vec![true]);
        assert_eq!(reader.atr, vec![0x3B, 0x01, 0x02, 0x03]);

        let mut buf = [0u8; 8];
        let n = reader.atr(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x3B, 0x01, 0x02, 0x03]);
        let mut small = [0u8; 2];
        assert_eq!(reader.atr(&mut small), Err(Error::BufferTooSmall));
    }

    #[test]
    fn length_header_only_counts_low_bits() {
        let bus = MockBus::new();
        // the high byte carries extra bits which do not extend the payload
        bus.push_raw(&[0x01, 0x05, 0x3B, 0x90, 0x00, 0x01, 0x02]);
        let (reader, _line) = open_kerkey(&bus);
        assert_eq!(reader.atr.len(), 5);
        assert_eq!(bus.unread(), 0);
    }

    #[test]
    fn transmit_is_unframed() {
        let bus = MockBus::new();
        bus.push_raw(&[0x00, 0x01, 0x3B]);
        let (mut reader, _line) = open_kerkey(&bus);

        bus.push_raw(&[0x00, 0x02, 0x90, 0x00]);
        let mut rx = [0u8; 4];
        let n = reader.transmit(&[0x00, 0xA4, 0x04, 0x00], &mut rx).unwrap();
        assert_eq!(&rx[..n], &[0x90, 0x00]);
        // the APDU goes out verbatim, no prologue or CRC
        assert_eq!(bus.writes(), vec![vec![0x00, 0xA4, 0x04, 0x00]]);
    }

    #[test]
    fn response_truncates_to_caller_buffer() {
        let bus = MockBus::new();
        bus.push_raw(&[0x00, 0x01, 0x3B]);
        let (mut reader, _line) = open_kerkey(&bus);

        bus.push_raw(&[0x00, 0x04, 0x01, 0x02, 0x03, 0x04]);
        let mut rx = [0u8; 2];
        let n = reader.transmit(&[0x00], &mut rx).unwrap();
        assert_eq!(n, 2);
        assert_eq!(rx, [0x01, 0x02]);
    }

    #[test]
    fn warm_reset_cycles_power_and_refreshes_atr() {
        let bus = MockBus::new();
        bus.push_raw(&[0x00, 0x01, 0x3B]);
        let (mut reader, line) = open_kerkey(&bus);

        bus.push_raw(&[0x00, 0x02, 0x3B, 0x99]);
        reader.warm_reset().unwrap();
        assert_eq!(line.events(), vec![true, false, true]);
        assert_eq!(reader.atr, vec![0x3B, 0x99]);
    }
}
