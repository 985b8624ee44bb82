pub mod config;
pub use config::*;
pub mod error;
pub use error::*;
pub mod gpio;
pub use gpio::*;
pub mod i2c;
pub use i2c::*;
pub mod ifd;
pub use ifd::*;
pub mod reader;
pub use reader::*;
