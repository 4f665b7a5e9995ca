//! [`Transport`] over embedded-hal SPI.
//!
//! The chip select is driven by hand rather than through `SpiDevice` because
//! a streaming read keeps it asserted across several driver calls.

use core::fmt::{self, Debug};

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::traits::Transport;

/// Error from the SPI bus or the chip select pin.
#[derive(PartialEq, Eq)]
pub enum TransportError<S, P> {
    Spi(S),
    Pin(P),
}

impl<S: Debug, P: Debug> Debug for TransportError<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Spi(spi) => write!(f, "TransportError::Spi({:?})", spi),
            TransportError::Pin(pin) => write!(f, "TransportError::Pin({:?})", pin),
        }
    }
}

#[cfg(feature = "defmt")]
impl<S, P> defmt::Format for TransportError<S, P> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TransportError::Spi(_) => defmt::write!(fmt, "TransportError::Spi"),
            TransportError::Pin(_) => defmt::write!(fmt, "TransportError::Pin"),
        }
    }
}

/// An SPI bus (mode 0 or 3, MSB first) plus an active-low chip select pin.
pub struct SpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Debug for SpiTransport<SPI, CS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiTransport").finish()
    }
}

impl<SPI, CS> SpiTransport<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Gives back the bus and the chip select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> Transport for SpiTransport<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    type Error = TransportError<SPI::Error, CS::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.cs.set_high().map_err(TransportError::Pin)
    }

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(TransportError::Pin)
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        // Clock out everything before raising CS, otherwise the chip sees a
        // truncated instruction.
        let flushed = self.spi.flush().map_err(TransportError::Spi);
        self.cs.set_high().map_err(TransportError::Pin)?;
        flushed
    }

    fn exchange_byte(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let mut buf = [byte];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(TransportError::Spi)?;
        Ok(buf[0])
    }
}
