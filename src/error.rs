use core::fmt::{self, Debug};

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// The error type used by this library.
///
/// This can encapsulate a transport error, and adds its own protocol errors
/// on top of that.
#[derive(PartialEq, Eq)]
pub enum Error<E> {
    /// A byte exchange or chip-select change failed.
    Transport(E),
    /// The address is not below the probed capacity. A capacity of 0 (unknown
    /// device) rejects every address.
    OutOfBounds { address: u32, capacity: u32 },
    /// An erase range or page write did not line up with sector or page
    /// boundaries.
    NotAligned,
    /// The BUSY bit did not clear within the allowed time. The chip contents
    /// touched by the operation are unspecified.
    Timeout,
    /// The chip did not latch WEL after the Write Enable instruction.
    WriteEnableFailed,
    /// A streaming read is active; call `end_read` first.
    ReadInProgress,
    /// `read_next_byte` was called without a successful `begin_read`.
    NoReadInProgress,
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for Error<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::Transport(_) => defmt::write!(fmt, "Error::Transport"),
            Error::OutOfBounds { address, capacity } => defmt::write!(
                fmt,
                "Error::OutOfBounds {{ address: {=u32:#x}, capacity: {=u32} }}",
                address,
                capacity
            ),
            Error::NotAligned => defmt::write!(fmt, "Error::NotAligned"),
            Error::Timeout => defmt::write!(fmt, "Error::Timeout"),
            Error::WriteEnableFailed => defmt::write!(fmt, "Error::WriteEnableFailed"),
            Error::ReadInProgress => defmt::write!(fmt, "Error::ReadInProgress"),
            Error::NoReadInProgress => defmt::write!(fmt, "Error::NoReadInProgress"),
        }
    }
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Error::Transport({:?})", e),
            Error::OutOfBounds { address, capacity } => write!(
                f,
                "Error::OutOfBounds {{ address: {:#08x}, capacity: {} }}",
                address, capacity
            ),
            Error::NotAligned => write!(f, "Error::NotAligned"),
            Error::Timeout => write!(f, "Error::Timeout"),
            Error::WriteEnableFailed => write!(f, "Error::WriteEnableFailed"),
            Error::ReadInProgress => write!(f, "Error::ReadInProgress"),
            Error::NoReadInProgress => write!(f, "Error::NoReadInProgress"),
        }
    }
}

impl<E: Debug> NorFlashError for Error<E> {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::NotAligned => NorFlashErrorKind::NotAligned,
            Error::OutOfBounds { .. } => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}
