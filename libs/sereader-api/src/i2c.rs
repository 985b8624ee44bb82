use crate::Error;

/// Byte-oriented access to one I²C slave.
///
/// The slave address is bound when the handle is created; a handle talks to
/// exactly one device. Transfers are all-or-nothing: a short read or write is
/// reported as [`Error::Transport`], and a slave that does not acknowledge as
/// [`Error::Nack`] so that callers can poll.
pub trait I2cBus {
    /// Read exactly `buf.len()` bytes from the slave.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Error>;
    /// Write all of `data` to the slave.
    fn write(&mut self, data: &[u8]) -> Result<(), Error>;
}
