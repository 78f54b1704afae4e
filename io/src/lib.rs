pub mod clock;
pub mod debounce;
pub mod display;
pub mod keypad;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

pub use clock::{Clock, SystemClock};
pub use display::DisplayDriver;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum IoError {
    #[error("pin {0} is invalid or reserved")]
    InvalidPin(u16),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the operation is not supported on this pin")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.kind())
    }
}

pub type IoResult<T> = Result<T, IoError>;

/// Logical pin address.
///
/// The namespace covers the real MCU pins as well as the virtual pins behind the analog
/// multiplexer and the shift register. Which range maps to which chip is up to the
/// [VirtualIo] implementation.
pub type Pin = u16;

/// Boolean/analog access to every pin of the board, real or virtual.
pub trait VirtualIo: Debug {
    /// Drives an output pin high (`true`) or low (`false`).
    fn set(&mut self, pin: Pin, state: bool) -> IoResult<()>;

    /// Reads the logic level of an input pin.
    fn read_digital(&mut self, pin: Pin) -> IoResult<bool>;

    /// Reads the raw ADC value of an input pin.
    fn read_analog(&mut self, pin: Pin) -> IoResult<u16>;

    /// Drives all the pins in `pins` to the same level.
    fn set_all(&mut self, pins: &[Pin], state: bool) -> IoResult<()> {
        for &pin in pins {
            self.set(pin, state)?;
        }
        Ok(())
    }
}

