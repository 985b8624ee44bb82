//! The block engine: sequence numbers, retransmission, waiting-time
//! extensions and APDU chaining on top of a raw bus handle.
//!
//! One engine owns one bus handle and the pair of one-bit sequence
//! counters. All waiting happens inline (guard time before every bus
//! transaction, MPOT between polls); there is no background machinery, and
//! the engine is not safe to share between threads.

use sereader_api::{Error, I2cBus};

use crate::bus::{sleep_ms, I2cBusExt, Timing};
use crate::crc;
use crate::t1::block::{
    self, Pcb, RError, SBlockKind, EPILOGUE_LEN, MAX_BLOCK_LEN, MAX_INF_LEN, NAD_SE_TO_HOST,
    PROLOGUE_LEN,
};

/// Pause before every APDU exchange. Without it the device intermittently
/// answers the next I-block with R(other error) under sustained load.
const XFER_SETTLE_MS: u64 = 1;

pub struct T1Engine {
    bus: Box<dyn I2cBus>,
    timing: Timing,
    /// N(S): sequence bit of the next I-block we send.
    ns: u8,
    /// N(R): sequence bit we expect in the device's next I-block.
    nr: u8,
    /// One retransmission is honored per exchange; set once it is spent.
    retransmitted: bool,
    /// The last transmitted frame, kept for retransmission.
    txbuf: [u8; MAX_BLOCK_LEN],
    txlen: usize,
    rxbuf: [u8; MAX_BLOCK_LEN],
}

impl T1Engine {
    pub fn new(bus: Box<dyn I2cBus>) -> Self {
        Self::with_timing(bus, Timing::default())
    }

    pub fn with_timing(bus: Box<dyn I2cBus>, timing: Timing) -> Self {
        T1Engine {
            bus,
            timing,
            ns: 0,
            nr: 0,
            retransmitted: false,
            txbuf: [0; MAX_BLOCK_LEN],
            txlen: 0,
            rxbuf: [0; MAX_BLOCK_LEN],
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Resets sequence counters and per-exchange state. Called on power-up
    /// and before resets.
    pub fn reset_state(&mut self) {
        self.ns = 0;
        self.nr = 0;
        self.clear_exchange();
    }

    /// Scrubs both frame buffers and re-arms the retransmit latch. Runs
    /// after every exchange, successful or not.
    fn clear_exchange(&mut self) {
        self.txbuf.fill(0);
        self.rxbuf.fill(0);
        self.txlen = 0;
        self.retransmitted = false;
    }

    /// Encodes a frame into the transmit cache and puts it on the wire.
    fn transmit_block(&mut self, pcb: Pcb, inf: &[u8]) -> Result<(), Error> {
        self.txlen = block::encode(&mut self.txbuf, pcb, inf)?;
        log::trace!("block out: {:02x?}", &self.txbuf[..self.txlen]);
        self.bus.write_retry(&self.txbuf[..self.txlen], &self.timing)
    }

    /// Sends one I-block. For a chained block (`more`), the token-passing
    /// R-block from the device is consumed here before returning.
    fn send_i(&mut self, inf: &[u8], more: bool) -> Result<(), Error> {
        let pcb = Pcb::I { seq: self.ns, more };
        self.ns ^= 1;
        self.transmit_block(pcb, inf)?;
        if !more {
            return Ok(());
        }
        let (pcb, len) = self.recv_block()?;
        match pcb {
            Pcb::R { seq, error: RError::None } => {
                if seq != self.ns {
                    log::error!("token R-block for N(R)={}, expected {}", seq, self.ns);
                    return Err(Error::Protocol);
                }
                if len != 0 {
                    log::error!("token R-block carries {} bytes of INF", len);
                    return Err(Error::Protocol);
                }
                Ok(())
            }
            other => {
                log::error!("expected token R-block, got {:?}", other);
                Err(Error::Protocol)
            }
        }
    }

    fn send_r(&mut self, nr: u8, error: RError) -> Result<(), Error> {
        self.transmit_block(Pcb::R { seq: nr, error }, &[])
    }

    fn send_s(&mut self, kind: SBlockKind, response: bool, inf: &[u8]) -> Result<(), Error> {
        self.transmit_block(Pcb::S { kind, response }, inf)
    }

    /// Answers a waiting-time extension without touching the transmit
    /// cache: the cached I-block must stay available for retransmission.
    fn send_wtx_response(&mut self, mult: u8) -> Result<(), Error> {
        let mut frame = [0u8; PROLOGUE_LEN + 1 + EPILOGUE_LEN];
        let n = block::encode(&mut frame, Pcb::S { kind: SBlockKind::Wtx, response: true }, &[mult])?;
        log::trace!("block out: {:02x?}", &frame[..n]);
        self.bus.write_retry(&frame[..n], &self.timing)
    }

    /// Receives one block, transparently answering WTX requests and
    /// honoring at most one retransmission request along the way.
    ///
    /// Returns the decoded PCB and the INF length; the INF itself sits at
    /// `rxbuf[PROLOGUE_LEN..PROLOGUE_LEN + len]`.
    fn recv_block(&mut self) -> Result<(Pcb, usize), Error> {
        // explicit loop: a device chattering WTX or R(error) forever must
        // not grow the stack or pin the thread
        for _ in 0..self.timing.max_retries() {
            let (pcb, len) = self.read_frame()?;
            match pcb {
                Pcb::S { kind: SBlockKind::Wtx, response: false } => {
                    if len != 1 {
                        log::error!("WTX request with LEN {}", len);
                        return Err(Error::Protocol);
                    }
                    let mult = self.rxbuf[PROLOGUE_LEN];
                    log::debug!("WTX requested, multiplier {}", mult);
                    self.send_wtx_response(mult)?;
                }
                Pcb::R { error, .. } if error != RError::None => {
                    if self.retransmitted {
                        log::error!("device rejected the retransmission too ({:?})", error);
                        return Err(Error::Timeout);
                    }
                    log::warn!("device reported {:?}, retransmitting", error);
                    self.retransmitted = true;
                    let txlen = self.txlen;
                    self.bus.write_retry(&self.txbuf[..txlen], &self.timing)?;
                }
                _ => return Ok((pcb, len)),
            }
        }
        log::error!("no usable block within {} reads", self.timing.max_retries());
        Err(Error::Timeout)
    }

    /// One raw frame off the bus: a 5-byte read (prologue plus whatever
    /// follows), then the remainder once LEN is known. Both reads land
    /// contiguously, so `rxbuf` holds the frame in wire order and the CRC
    /// check indexes it in place.
    fn read_frame(&mut self) -> Result<(Pcb, usize), Error> {
        const FIRST_READ: usize = PROLOGUE_LEN + EPILOGUE_LEN;
        self.bus.read_retry(&mut self.rxbuf[..FIRST_READ], &self.timing)?;

        let nad = self.rxbuf[0];
        if nad != NAD_SE_TO_HOST {
            // logged only; the frame is still processed
            log::warn!("unexpected NAD {:#04x} from device", nad);
        }
        let len = self.rxbuf[2] as usize;
        if len > MAX_INF_LEN {
            log::error!("LEN {} exceeds the {}-byte INF limit", len, MAX_INF_LEN);
            return Err(Error::Protocol);
        }
        if len > 0 {
            self.bus.read_retry(&mut self.rxbuf[FIRST_READ..FIRST_READ + len], &self.timing)?;
        }

        let total = PROLOGUE_LEN + len + EPILOGUE_LEN;
        log::trace!("block in: {:02x?}", &self.rxbuf[..total]);
        let epilogue = [self.rxbuf[PROLOGUE_LEN + len], self.rxbuf[PROLOGUE_LEN + len + 1]];
        if !crc::verify(&self.rxbuf[..PROLOGUE_LEN + len], epilogue) {
            log::error!("CRC mismatch on {:02x?}", &self.rxbuf[..total]);
            return Err(Error::Protocol);
        }
        let pcb = Pcb::parse(self.rxbuf[1]).map_err(|e| {
            log::error!("unknown PCB {:#04x}", self.rxbuf[1]);
            e
        })?;
        Ok((pcb, len))
    }

    /// Soft-resets the interface; the device answers with its raw ATR.
    pub fn soft_reset(&mut self) -> Result<Vec<u8>, Error> {
        let r = self.soft_reset_inner();
        self.clear_exchange();
        r
    }

    fn soft_reset_inner(&mut self) -> Result<Vec<u8>, Error> {
        self.send_s(SBlockKind::SoftReset, false, &[])?;
        let (pcb, len) = self.recv_block()?;
        match pcb {
            Pcb::S { kind: SBlockKind::SoftReset, response: true } => {
                Ok(self.rxbuf[PROLOGUE_LEN..PROLOGUE_LEN + len].to_vec())
            }
            other => {
                log::error!("soft reset answered by {:?}", other);
                Err(Error::Protocol)
            }
        }
    }

    /// Full chip reset, used when no reset line is wired. Does not return
    /// an ATR.
    pub fn chip_reset(&mut self) -> Result<(), Error> {
        let r = self.chip_reset_inner();
        self.clear_exchange();
        r
    }

    fn chip_reset_inner(&mut self) -> Result<(), Error> {
        self.send_s(SBlockKind::ChipReset, false, &[])?;
        let (pcb, _) = self.recv_block()?;
        match pcb {
            Pcb::S { kind: SBlockKind::ChipReset, response: true } => Ok(()),
            other => {
                log::error!("chip reset answered by {:?}", other);
                Err(Error::Protocol)
            }
        }
    }

    /// Resynchronizes the sequence counters on both sides.
    pub fn resync(&mut self) -> Result<(), Error> {
        let r = self.resync_inner();
        self.clear_exchange();
        r
    }

    fn resync_inner(&mut self) -> Result<(), Error> {
        self.send_s(SBlockKind::Resync, false, &[])?;
        let (pcb, _) = self.recv_block()?;
        match pcb {
            Pcb::S { kind: SBlockKind::Resync, response: true } => {
                self.ns = 0;
                self.nr = 0;
                Ok(())
            }
            other => {
                log::error!("resync answered by {:?}", other);
                Err(Error::Protocol)
            }
        }
    }

    /// One APDU exchange: chunks `tx` into I-blocks, reassembles the
    /// (possibly chained) response into `rx`. Returns the response length;
    /// a response longer than `rx` is truncated, never an error.
    pub fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error> {
        if tx.is_empty() {
            return Err(Error::InvalidArgument);
        }
        sleep_ms(XFER_SETTLE_MS);
        let r = self.transceive_inner(tx, rx);
        self.clear_exchange();
        r
    }

    fn transceive_inner(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error> {
        let mut chunks = tx.chunks(MAX_INF_LEN).peekable();
        while let Some(chunk) = chunks.next() {
            self.send_i(chunk, chunks.peek().is_some())?;
        }

        let mut received = 0;
        let mut truncated = false;
        loop {
            let (pcb, len) = self.recv_block()?;
            let (seq, more) = match pcb {
                Pcb::I { seq, more } => (seq, more),
                other => {
                    log::error!("expected I-block, got {:?}", other);
                    return Err(Error::Protocol);
                }
            };
            if seq != self.nr {
                log::warn!("device sent N(S)={}, expected {}", seq, self.nr);
            }
            self.nr = seq ^ 1;

            let take = len.min(rx.len() - received);
            if take < len && !truncated {
                truncated = true;
                log::warn!("response exceeds the {}-byte buffer, truncating", rx.len());
            }
            rx[received..received + take]
                .copy_from_slice(&self.rxbuf[PROLOGUE_LEN..PROLOGUE_LEN + take]);
            received += take;

            if !more {
                break;
            }
            self.send_r(seq ^ 1, RError::None)?;
        }
        Ok(received)
    }
}
