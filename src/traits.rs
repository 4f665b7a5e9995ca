/// Byte-level access to one flash chip.
///
/// The protocol engine is written only against this trait, so a bit-banged
/// bus and a hardware SPI peripheral look the same to it. Chip select is
/// active low on the wire; `select` asserts it.
pub trait Transport {
    type Error;

    /// Platform bring-up: bus direction, clock and an idle (deselected) chip
    /// select line.
    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Assert chip select. An instruction starts with the next exchanged byte.
    fn select(&mut self) -> Result<(), Self::Error>;

    /// Release chip select. Program and erase cycles start on this edge.
    fn deselect(&mut self) -> Result<(), Self::Error>;

    /// Full-duplex exchange of a single byte.
    fn exchange_byte(&mut self, byte: u8) -> Result<u8, Self::Error>;
}
