//! Guard-time and retry policy shared by every driver that polls the bus.

use std::thread;
use std::time::Duration;

use sereader_api::{Error, I2cBus};

/// Guard time before every bus transaction, microseconds (SEGT).
pub const SEGT_US: u32 = 10;
/// Minimum polling time between NACKed attempts, microseconds (MPOT).
pub const MPOT_US: u32 = 1_000;
/// Block waiting time, milliseconds (BWT).
pub const BWT_MS: u32 = 1_000;
/// Wake-up delay after cycling the supply, milliseconds (PWT).
pub const PWT_MS: u64 = 5;

/// Timing knobs of one session. Defaults are the conservative power-on
/// values; a parsed ATR may replace them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub segt_us: u32,
    pub mpot_us: u32,
    pub bwt_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing { segt_us: SEGT_US, mpot_us: MPOT_US, bwt_ms: BWT_MS }
    }
}

impl Timing {
    /// NACK retry budget: how many MPOT polls fit in one BWT.
    pub fn max_retries(&self) -> u32 {
        (self.bwt_ms.saturating_mul(1_000) / self.mpot_us.max(1)).max(1)
    }
}

pub(crate) fn sleep_us(us: u32) {
    if us > 0 {
        thread::sleep(Duration::from_micros(us.into()));
    }
}

pub(crate) fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Retry helpers for raw bus handles.
///
/// Every transaction is preceded by the SEGT guard sleep. A NACK is retried
/// after an MPOT sleep until the budget is spent, then becomes
/// [`Error::Timeout`]; any other failure is final. Partial transfers never
/// get here, the transport reports them as [`Error::Transport`].
pub trait I2cBusExt {
    fn read_retry(&mut self, buf: &mut [u8], timing: &Timing) -> Result<(), Error>;
    fn write_retry(&mut self, data: &[u8], timing: &Timing) -> Result<(), Error>;
}

impl<T: I2cBus + ?Sized> I2cBusExt for T {
    fn read_retry(&mut self, buf: &mut [u8], timing: &Timing) -> Result<(), Error> {
        sleep_us(timing.segt_us);
        let mut remaining = timing.max_retries();
        loop {
            match self.read(buf) {
                Err(Error::Nack) if remaining > 0 => {
                    remaining -= 1;
                    sleep_us(timing.mpot_us);
                }
                Err(Error::Nack) => {
                    log::error!("device not ready after {} read polls", timing.max_retries());
                    return Err(Error::Timeout);
                }
                other => return other,
            }
        }
    }

    fn write_retry(&mut self, data: &[u8], timing: &Timing) -> Result<(), Error> {
        sleep_us(timing.segt_us);
        let mut remaining = timing.max_retries();
        loop {
            match self.write(data) {
                Err(Error::Nack) if remaining > 0 => {
                    remaining -= 1;
                    sleep_us(timing.mpot_us);
                }
                Err(Error::Nack) => {
                    log::error!("device not ready after {} write polls", timing.max_retries());
                    return Err(Error::Timeout);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_timing, MockBus};

    #[test]
    fn default_retry_budget() {
        // 1000 ms of BWT at a 1 ms poll interval
        assert_eq!(Timing::default().max_retries(), 1_000);
    }

    #[test]
    fn read_retries_through_nacks() {
        let mut bus = MockBus::new();
        bus.set_read_nacks(3);
        bus.push_raw(&[0xA5, 0x00]);
        let mut buf = [0u8; 2];
        (&mut bus as &mut dyn I2cBus).read_retry(&mut buf, &test_timing()).unwrap();
        assert_eq!(buf, [0xA5, 0x00]);
    }

    #[test]
    fn read_budget_exhaustion_is_timeout() {
        let mut bus = MockBus::new();
        let mut buf = [0u8; 1];
        let err = (&mut bus as &mut dyn I2cBus).read_retry(&mut buf, &test_timing());
        assert_eq!(err, Err(Error::Timeout));
    }

    #[test]
    fn write_retries_then_sends() {
        let mut bus = MockBus::new();
        bus.set_write_nacks(2);
        (&mut bus as &mut dyn I2cBus).write_retry(&[0x5A, 0x00], &test_timing()).unwrap();
        assert_eq!(bus.writes(), vec![vec![0x5A, 0x00]]);
    }

    #[test]
    fn hard_errors_are_not_retried() {
        let mut bus = MockBus::new();
        bus.fail_writes(Error::Transport);
        let err = (&mut bus as &mut dyn I2cBus).write_retry(&[0x00], &test_timing());
        assert_eq!(err, Err(Error::Transport));
        assert_eq!(bus.write_attempts(), 1);
    }
}
