//! Scripted bus and GPIO doubles for driver tests.
//!
//! Both doubles are cheap clones over shared state, so a test can hand one
//! clone to the driver under test (boxed as the trait object) and keep
//! another to script and inspect.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use sereader_api::{Error, GpioLine, I2cBus};

use crate::bus::Timing;
use crate::crc;
use crate::t1::block::NAD_SE_TO_HOST;

/// Fast timing for tests: no guard sleeps, 1 µs polls, a 1000-poll budget.
pub fn test_timing() -> Timing {
    Timing { segt_us: 0, mpot_us: 1, bwt_ms: 1 }
}

#[derive(Default)]
struct BusState {
    inbound: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    read_nacks: u32,
    write_nacks: u32,
    fail_writes: Option<Error>,
    write_attempts: u32,
}

/// A bus whose device side is a pre-scripted byte stream.
///
/// Reads drain the stream in order regardless of how the driver slices its
/// read transactions, which is exactly how the real device streams a frame
/// across the 5-byte and LEN-byte reads. Writes are recorded verbatim. An
/// exhausted stream NACKs, like a device with nothing to say.
#[derive(Clone)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus { state: Rc::new(RefCell::new(BusState::default())) }
    }

    /// Queues one device frame (NAD 0xA5, CRC appended) onto the stream.
    pub fn push_frame(&self, pcb: u8, inf: &[u8]) {
        self.push_frame_nad(NAD_SE_TO_HOST, pcb, inf);
    }

    /// Queues a device frame with an arbitrary NAD byte.
    pub fn push_frame_nad(&self, nad: u8, pcb: u8, inf: &[u8]) {
        let mut frame = vec![nad, pcb, inf.len() as u8];
        frame.extend_from_slice(inf);
        let crc = crc::block_crc(&frame).to_be_bytes();
        frame.extend_from_slice(&crc);
        self.state.borrow_mut().inbound.extend(frame);
    }

    /// Queues raw bytes without framing (corrupted-frame tests).
    pub fn push_raw(&self, bytes: &[u8]) {
        self.state.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    pub fn set_read_nacks(&self, n: u32) {
        self.state.borrow_mut().read_nacks = n;
    }

    pub fn set_write_nacks(&self, n: u32) {
        self.state.borrow_mut().write_nacks = n;
    }

    pub fn fail_writes(&self, e: Error) {
        self.state.borrow_mut().fail_writes = Some(e);
    }

    /// Everything the driver wrote, one transaction per entry.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().writes.clone()
    }

    pub fn write_attempts(&self) -> u32 {
        self.state.borrow().write_attempts
    }

    /// Bytes the driver left unread; zero for a clean exchange.
    pub fn unread(&self) -> usize {
        self.state.borrow().inbound.len()
    }
}

impl I2cBus for MockBus {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut s = self.state.borrow_mut();
        if s.read_nacks > 0 {
            s.read_nacks -= 1;
            return Err(Error::Nack);
        }
        if s.inbound.len() < buf.len() {
            return Err(Error::Nack);
        }
        for b in buf.iter_mut() {
            *b = s.inbound.pop_front().unwrap();
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut s = self.state.borrow_mut();
        s.write_attempts += 1;
        if let Some(e) = s.fail_writes {
            return Err(e);
        }
        if s.write_nacks > 0 {
            s.write_nacks -= 1;
            return Err(Error::Nack);
        }
        s.writes.push(data.to_vec());
        Ok(())
    }
}

/// Records the power sequencing applied to a reset line: `true` per enable,
/// `false` per disable.
#[derive(Clone)]
pub struct MockLine {
    events: Rc<RefCell<Vec<bool>>>,
}

impl MockLine {
    pub fn new() -> Self {
        MockLine { events: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn events(&self) -> Vec<bool> {
        self.events.borrow().clone()
    }
}

impl GpioLine for MockLine {
    fn enable(&mut self) -> Result<(), Error> {
        self.events.borrow_mut().push(true);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Error> {
        self.events.borrow_mut().push(false);
        Ok(())
    }
}
