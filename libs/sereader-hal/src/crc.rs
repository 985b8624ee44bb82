//! Block checksums: CRC-16/X.25, in the byte order the epilogue carries.

/// Computes the checksum over `data` (NAD through the end of INF).
///
/// The value is byte-swapped after the final XOR, so storing it big-endian
/// puts the low half of the true X.25 remainder on the wire first, the
/// order the device emits and checks.
pub fn block_crc(data: &[u8]) -> u16 {
    crc16::State::<crc16::X_25>::calculate(data).swap_bytes()
}

/// Checks a received frame against its epilogue bytes as read off the wire,
/// high byte first.
pub fn verify(frame: &[u8], epilogue: [u8; 2]) -> bool {
    block_crc(frame).to_be_bytes() == epilogue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(block_crc(&[]), 0x0000);
    }

    #[test]
    fn reference_frames() {
        // S(soft reset) request prologue
        assert_eq!(block_crc(&[0x5A, 0xCF, 0x00]).to_be_bytes(), [0x37, 0x7F]);
        // empty I-block, N(S)=0, no chain
        assert_eq!(block_crc(&[0x5A, 0x00, 0x00]).to_be_bytes(), [0x55, 0x36]);
        // four-byte select APDU in a single I-block
        assert_eq!(
            block_crc(&[0x5A, 0x00, 0x04, 0x00, 0xA4, 0x04, 0x00]).to_be_bytes(),
            [0x2E, 0x31]
        );
    }

    #[test]
    fn verify_accepts_and_rejects() {
        let frame = [0xA5, 0x00, 0x02, 0x90, 0x00];
        assert!(verify(&frame, [0x02, 0xAF]));
        assert!(!verify(&frame, [0xAF, 0x02]));
        assert!(!verify(&frame, [0x02, 0xAE]));
    }
}
