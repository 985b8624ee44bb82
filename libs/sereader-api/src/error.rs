use std::fmt;

/// Library-wide error type.
///
/// Deliberately a flat `Copy` enum: callers match on the category, and the
/// detail (errno, offending PCB, frame dump) is logged next to the
/// transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Reader configuration string could not be parsed.
    ParseError,
    /// The configured device node could not be opened or bound.
    NoDevice,
    /// The slave did not acknowledge the transfer (ENXIO, ETIMEDOUT or
    /// EREMOTEIO from the adapter driver).
    Nack,
    /// Hard transport failure: any other I/O error, or a short transfer.
    Transport,
    /// Retry budget exhausted, or a second retransmit was requested within
    /// one exchange.
    Timeout,
    /// Framing violation: bad length, CRC mismatch, unexpected PCB or
    /// sequence number.
    Protocol,
    /// Caller-supplied buffer cannot hold the result.
    BufferTooSmall,
    /// A call argument is out of bounds or otherwise unusable.
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ParseError => f.write_str("malformed reader configuration"),
            Error::NoDevice => f.write_str("device node unavailable"),
            Error::Nack => f.write_str("slave did not acknowledge"),
            Error::Transport => f.write_str("bus transport failure"),
            Error::Timeout => f.write_str("device did not respond in time"),
            Error::Protocol => f.write_str("block protocol violation"),
            Error::BufferTooSmall => f.write_str("buffer too small for result"),
            Error::InvalidArgument => f.write_str("invalid argument"),
        }
    }
}

impl std::error::Error for Error {}
