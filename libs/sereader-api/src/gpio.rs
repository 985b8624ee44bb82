use crate::Error;

/// One output line used to power or reset a secure element.
///
/// `enable` drives the line to its asserted state; whether that is
/// electrically high or low is decided by the implementation, callers only
/// see the logical polarity. Readers model "no reset line wired" as
/// `Option<Box<dyn GpioLine>>` set to `None`, and treat power actions on an
/// absent line as successful no-ops.
pub trait GpioLine {
    fn enable(&mut self) -> Result<(), Error>;
    fn disable(&mut self) -> Result<(), Error>;
}
