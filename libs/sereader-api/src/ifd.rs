//! Constants of the PC/SC IFD handler ABI that the host shim forwards to
//! pcsc-lite. Numeric values are fixed by `ifdhandler.h`.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::Error;

/// Exit codes returned to the IFD host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum IfdStatus {
    Success = 0,
    ErrorTag = 600,
    ErrorPowerAction = 608,
    CommunicationError = 612,
    ResponseTimeout = 613,
    NotSupported = 614,
    NoSuchDevice = 617,
    InsufficientBuffer = 618,
}

impl From<Error> for IfdStatus {
    fn from(e: Error) -> Self {
        match e {
            Error::ParseError | Error::NoDevice => IfdStatus::NoSuchDevice,
            Error::Nack | Error::Transport | Error::Timeout | Error::Protocol => {
                IfdStatus::CommunicationError
            }
            Error::BufferTooSmall => IfdStatus::InsufficientBuffer,
            Error::InvalidArgument => IfdStatus::CommunicationError,
        }
    }
}

/// `TAG_IFD_*` capability tags a host may query.
pub mod tags {
    pub const ATR: u32 = 0x0303;
    pub const SLOT_THREAD_SAFE: u32 = 0x0FAC;
    pub const THREAD_SAFE: u32 = 0x0FAD;
    pub const SLOTS_NUMBER: u32 = 0x0FAE;
    pub const SIMULTANEOUS_ACCESS: u32 = 0x0FAF;
}

/// Capability values reported for the tags above. One wired slot, and the
/// session is not safe for concurrent callers, so both thread-safety answers
/// are "no".
pub mod caps {
    pub const SIMULTANEOUS_ACCESS: u8 = 16;
    pub const THREAD_SAFE: u8 = 0;
    pub const SLOTS_NUMBER: u8 = 1;
    pub const SLOT_THREAD_SAFE: u8 = 0;
}

/// Longest ATR a host will accept (ISO 7816-3).
pub const MAX_ATR_LEN: usize = 33;
