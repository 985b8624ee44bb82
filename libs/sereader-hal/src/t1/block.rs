//! Block framing: NAD/PCB/LEN prologue, INF, CRC epilogue.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use sereader_api::Error;

use crate::crc;

/// Node address byte, host to SE.
pub const NAD_HOST_TO_SE: u8 = 0x5A;
/// Node address byte, SE to host.
pub const NAD_SE_TO_HOST: u8 = 0xA5;

/// Prologue: NAD, PCB, LEN.
pub const PROLOGUE_LEN: usize = 3;
/// Epilogue: CRC, high byte first.
pub const EPILOGUE_LEN: usize = 2;
/// Information field ceiling (IFSC).
pub const MAX_INF_LEN: usize = 254;
/// A maximal block: prologue + INF + epilogue.
pub const MAX_BLOCK_LEN: usize = PROLOGUE_LEN + MAX_INF_LEN + EPILOGUE_LEN;

// PCB bit layout
const I_MASK: u8 = 0b1001_1111;
const I_TEMPLATE: u8 = 0b0000_0000;
const I_SEQ: u8 = 0b0100_0000;
const I_MORE: u8 = 0b0010_0000;

const R_MASK: u8 = 0b1110_1100;
const R_TEMPLATE: u8 = 0b1000_0000;
const R_SEQ: u8 = 0b0001_0000;
const R_ERROR: u8 = 0b0000_0011;

const S_MASK: u8 = 0b1100_0000;
const S_TEMPLATE: u8 = 0b1100_0000;
const S_RESPONSE: u8 = 0b0010_0000;
const S_KIND: u8 = 0b0001_1111;

/// Supervisory block types (PCB bits 4..0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum SBlockKind {
    Resync = 0x00,
    SetIfs = 0x01,
    Abort = 0x02,
    Wtx = 0x03,
    EndOfApdu = 0x05,
    ChipReset = 0x06,
    GetAtr = 0x07,
    SoftReset = 0x0F,
}

/// Error bits of an R-block (EE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RError {
    None,
    Crc,
    Other,
}

impl RError {
    fn to_bits(self) -> u8 {
        match self {
            RError::None => 0,
            RError::Crc => 1,
            RError::Other => 2,
        }
    }

    fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0 => Ok(RError::None),
            1 => Ok(RError::Crc),
            2 => Ok(RError::Other),
            _ => Err(Error::Protocol),
        }
    }
}

/// Decoded protocol control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pcb {
    /// Information block: one-bit send sequence number plus the chain bit.
    I { seq: u8, more: bool },
    /// Receive-ready: acknowledges (or faults) the peer's last I-block.
    R { seq: u8, error: RError },
    /// Supervisory request or response.
    S { kind: SBlockKind, response: bool },
}

impl Pcb {
    pub fn to_byte(self) -> u8 {
        match self {
            Pcb::I { seq, more } => {
                I_TEMPLATE | if seq != 0 { I_SEQ } else { 0 } | if more { I_MORE } else { 0 }
            }
            Pcb::R { seq, error } => {
                R_TEMPLATE | if seq != 0 { R_SEQ } else { 0 } | error.to_bits()
            }
            Pcb::S { kind, response } => {
                S_TEMPLATE | if response { S_RESPONSE } else { 0 } | kind as u8
            }
        }
    }

    pub fn parse(byte: u8) -> Result<Self, Error> {
        if byte & I_MASK == I_TEMPLATE {
            return Ok(Pcb::I { seq: u8::from(byte & I_SEQ != 0), more: byte & I_MORE != 0 });
        }
        if byte & R_MASK == R_TEMPLATE {
            return Ok(Pcb::R {
                seq: u8::from(byte & R_SEQ != 0),
                error: RError::from_bits(byte & R_ERROR)?,
            });
        }
        if byte & S_MASK == S_TEMPLATE {
            let kind = SBlockKind::from_u8(byte & S_KIND).ok_or(Error::Protocol)?;
            return Ok(Pcb::S { kind, response: byte & S_RESPONSE != 0 });
        }
        Err(Error::Protocol)
    }
}

/// Builds one outbound frame in place: prologue at the front of `buf`, INF,
/// then the CRC over everything before it. Returns the wire length.
///
/// `buf` must hold at least `PROLOGUE_LEN + inf.len() + EPILOGUE_LEN` bytes.
pub fn encode(buf: &mut [u8], pcb: Pcb, inf: &[u8]) -> Result<usize, Error> {
    if inf.len() > MAX_INF_LEN {
        return Err(Error::InvalidArgument);
    }
    buf[0] = NAD_HOST_TO_SE;
    buf[1] = pcb.to_byte();
    buf[2] = inf.len() as u8;
    buf[PROLOGUE_LEN..PROLOGUE_LEN + inf.len()].copy_from_slice(inf);
    let crc = crc::block_crc(&buf[..PROLOGUE_LEN + inf.len()]).to_be_bytes();
    buf[PROLOGUE_LEN + inf.len()..PROLOGUE_LEN + inf.len() + EPILOGUE_LEN].copy_from_slice(&crc);
    Ok(PROLOGUE_LEN + inf.len() + EPILOGUE_LEN)
}
