use crate::Error;

/// The uniform face a secure-element driver shows the IFD shim.
///
/// One implementation per device family. The shim holds a
/// `Box<dyn SeReader>` per configured unit and forwards the IFD actions to
/// it; nothing here enforces call order, the host is expected to bracket
/// `transmit` calls between `power_up` and `power_down`.
pub trait SeReader {
    /// Power the element and leave it ready for APDU exchange.
    fn power_up(&mut self) -> Result<(), Error>;
    /// Remove power. A no-op when the device has no controllable supply.
    fn power_down(&mut self) -> Result<(), Error>;
    /// Reset without a power cycle and refresh the cached ATR.
    fn warm_reset(&mut self) -> Result<(), Error>;
    /// Write the conforming ATR into `buf`, returning its length.
    fn atr(&self, buf: &mut [u8]) -> Result<usize, Error>;
    /// Exchange one APDU. Returns the number of response bytes written to
    /// `rx`; a response longer than `rx` is truncated, not failed.
    fn transmit(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Error>;
}
