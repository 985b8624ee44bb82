//! ATR handling: parsing the device's native answer-to-reset and rewriting
//! it into an ISO 7816-3 conforming one for the host.
//!
//! The native ATR is laid out as
//!
//! ```text
//! PVER(1) VID(5) DLLP_LEN(1) DLLP[BWT.be16 IFSC.be16 ..]
//! PLID(1) PLP_LEN(1) PLP[MCF.be16 CONFIG MPOT RFU(3) SEGT.be16 WUT.be16]
//! HB_LEN(1) HB(HB_LEN)
//! ```
//!
//! and is longer than ISO 7816-3 permits, so the host never sees it
//! directly: [`rewrite`] keeps only the historical bytes under a fixed
//! conforming prologue.

use sereader_api::Error;

use crate::bus::Timing;

/// Fixed prologue of the conforming ATR: TS direct convention, T0 with the
/// historical-byte count still to be OR'd in, TA1=0x96, TD1 chaining to a
/// T=1 TD2, TA3 advertising IFSC 254.
const PROLOGUE: [u8; 8] = [0x3B, 0xF0, 0x96, 0x00, 0x00, 0x80, 0x11, 0xFE];

/// T0 carries four historical-byte count bits.
const MAX_HISTORICAL: usize = 15;

/// Timing-relevant fields of a parsed native ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtrInfo {
    /// Block waiting time, milliseconds.
    pub bwt_ms: u16,
    /// Maximum information field size of the device.
    pub ifsc: u16,
    /// Minimum polling time, milliseconds.
    pub mpot_ms: u8,
    /// Guard time between bus transactions, microseconds.
    pub segt_us: u16,
}

impl AtrInfo {
    /// Strict parse of the native layout; `None` for anything malformed.
    /// Callers fall back to default timing in that case.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 {
            return None;
        }
        let dllp_len = data[6] as usize;
        let rem = data.get(7..)?;
        if dllp_len < 4 || rem.len() < dllp_len {
            return None;
        }
        let bwt_ms = u16::from_be_bytes([rem[0], rem[1]]);
        let ifsc = u16::from_be_bytes([rem[2], rem[3]]);

        let rem = &rem[dllp_len..];
        // rem[0] is the PLID; the parameter block follows its length byte
        let plp_len = *rem.get(1)? as usize;
        let plp = rem.get(2..2 + plp_len)?;
        if plp.len() < 11 {
            return None;
        }
        let mpot_ms = plp[3];
        let segt_us = u16::from_be_bytes([plp[7], plp[8]]);

        Some(AtrInfo { bwt_ms, ifsc, mpot_ms, segt_us })
    }

    /// Session timing advertised by the device. Zero fields fall back to
    /// the smallest sane value rather than dividing the retry budget away.
    pub fn timing(&self) -> Timing {
        Timing {
            segt_us: u32::from(self.segt_us),
            mpot_us: u32::from(self.mpot_ms.max(1)) * 1_000,
            bwt_ms: u32::from(self.bwt_ms.max(1)),
        }
    }
}

/// Rewrites the native ATR into a conforming one in `out`, returning the
/// total length (9 + historical bytes).
pub fn rewrite(native: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    // walk to the historical bytes: header+VID, DLLP, PLID, PLP
    let mut off = 6usize;
    let dllp_len = *native.get(off).ok_or(Error::Protocol)? as usize;
    off += 1 + dllp_len;
    off += 1; // PLID
    let plp_len = *native.get(off).ok_or(Error::Protocol)? as usize;
    off += 1 + plp_len;
    let hb_len = *native.get(off).ok_or(Error::Protocol)? as usize;
    off += 1;
    if hb_len > MAX_HISTORICAL {
        log::error!("{} historical bytes do not fit T0", hb_len);
        return Err(Error::BufferTooSmall);
    }
    let hb = native.get(off..off + hb_len).ok_or(Error::Protocol)?;
    let total = PROLOGUE.len() + hb_len + 1;
    if out.len() < total {
        return Err(Error::BufferTooSmall);
    }

    out[..PROLOGUE.len()].copy_from_slice(&PROLOGUE);
    out[1] |= hb_len as u8;
    out[PROLOGUE.len()..PROLOGUE.len() + hb_len].copy_from_slice(hb);
    let mut tck = 0u8;
    for &b in &out[1..total - 1] {
        tck ^= b;
    }
    out[total - 1] = tck;
    Ok(total)
}
