//! Drivers for I²C-attached secure elements, presented to a PC/SC-style
//! host through the `sereader-api` traits.
//!
//! The SE05x speaks a T=1-flavored block protocol ([`t1`]); the Kerkey uses
//! a bare length-prefixed exchange ([`kerkey`]). Both sit on the same Linux
//! transports ([`i2cdev`], [`gpio`]) and can be driven through
//! `sereader_api::SeReader`.

pub mod atr;
pub mod bus;
pub mod crc;
pub mod gpio;
pub mod i2cdev;
pub mod kerkey;
pub mod se05x;
pub mod t1;

pub use kerkey::KerkeyReader;
pub use se05x::Se05xReader;

#[cfg(test)]
pub(crate) mod testutil;
