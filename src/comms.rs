//! W25Qxx instruction sequencing. Section numbers below follow the W25Q64JV
//! datasheet: https://www.winbond.com/resource-files/w25q64jv%20revj%2003272018%20plus.pdf

use crate::config::{Config, PAGE_SIZE, SECTOR_SIZE};
use crate::error::Error;
use crate::identification::Identification;
use crate::traits::Transport;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};

#[repr(u8)]
#[derive(Clone, Copy)]
enum Opcode {
    PageProg = 0x02,
    Read = 0x03,
    /// Clear the write enable latch.
    WriteDisable = 0x04,
    /// Read the 8-bit status register 1.
    ReadStatus = 0x05,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    SectorErase = 0x20,
    ChipErase = 0x60,
    /// Read the 8-bit manufacturer and device IDs.
    ReadMfDId = 0x90,
    /// Read manufacturer ID, memory type and capacity code.
    ReadJedecId = 0x9F,
}

bitflags::bitflags! {
    /// Status register 1 bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The block protect bits.
        const PROT = 0b0001_1100;
        /// Top/bottom protect.
        const TB = 1 << 5;
        /// Sector/block protect.
        const SEC = 1 << 6;
        /// **S**tatus **R**egister **P**rotect bit.
        const SRP = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Status({=u8:#010b})", self.bits())
    }
}

/// Driver for one W25Qxx chip on a [`Transport`].
///
/// Every operation is a blocking, linear sequence of byte exchanges. The only
/// state kept between calls is the probed capacity and whether a streaming
/// read currently holds the chip selected.
pub struct W25Flash<T, D> {
    transport: T,
    delay: D,
    config: Config,
    capacity: u32,
    read_active: bool,
}

impl<T, D> Debug for W25Flash<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("W25Flash")
            .field("capacity", &self.capacity)
            .field("read_active", &self.read_active)
            .finish()
    }
}

impl<T, D> W25Flash<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Creates a driver with default timing. Call [`begin`](Self::begin)
    /// before any addressed operation: until then the capacity is 0 and
    /// every address is out of bounds.
    pub fn new(transport: T, delay: D) -> Self {
        Self::with_config(transport, delay, Config::default())
    }

    pub fn with_config(transport: T, delay: D, config: Config) -> Self {
        Self {
            transport,
            delay,
            config,
            capacity: 0,
            read_active: false,
        }
    }

    /// Capacity in bytes found by [`begin`](Self::begin), 0 if unknown.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a streaming read holds the chip selected.
    pub fn is_reading(&self) -> bool {
        self.read_active
    }

    /// Gives back the transport and the delay provider.
    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Brings up the transport, identifies the chip and records its capacity.
    ///
    /// An unrecognised JEDEC ID is not an error: the capacity becomes 0 and
    /// every addressed operation afterwards fails with
    /// [`Error::OutOfBounds`].
    pub fn begin(&mut self) -> Result<u32, Error<T::Error>> {
        self.idle()?;
        self.transport.init().map_err(Error::Transport)?;
        let id = self.read_jedec_id()?;
        self.capacity = id.capacity();
        if self.capacity == 0 {
            warn!("Unrecognised flash: JEDEC ID {}", id.jedec_id());
        } else {
            debug!(
                "Flash JEDEC ID {}, {} bytes",
                id.jedec_id(),
                self.capacity
            );
        }
        Ok(self.capacity)
    }

    /// Reads the JEDEC manufacturer/device identification (9Fh).
    pub fn read_jedec_id(&mut self) -> Result<Identification, Error<T::Error>> {
        self.idle()?;
        let mut id = [0u8; 3];
        self.command_with_response(&[Opcode::ReadJedecId as u8], &mut id)?;
        Ok(Identification::from_jedec_id(&id))
    }

    /// Manufacturer / Device ID (90h), returns `[manufacturer, device]`.
    pub fn read_manufacturer_device_id(&mut self) -> Result<[u8; 2], Error<T::Error>> {
        self.idle()?;
        let mut response = [0u8; 2];
        self.command_with_response(&[Opcode::ReadMfDId as u8, 0, 0, 0], &mut response)?;
        Ok(response)
    }

    /// Reads the status register.
    pub fn read_status(&mut self) -> Result<Status, Error<T::Error>> {
        self.idle()?;
        self.status()
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<T::Error>> {
        Ok(self.read_status()?.contains(Status::BUSY))
    }

    pub fn is_write_enabled(&mut self) -> Result<bool, Error<T::Error>> {
        Ok(self.read_status()?.contains(Status::WEL))
    }

    /// Polls the status register until BUSY clears.
    ///
    /// Fails with [`Error::Timeout`] once more than `timeout_ms` has been
    /// spent sleeping between polls. Time is measured by the sleeps, so the
    /// wall-clock time spent before failing is never shorter than the timeout.
    pub fn wait_for_ready(&mut self, timeout_ms: u32) -> Result<(), Error<T::Error>> {
        self.idle()?;
        let limit_us = u64::from(timeout_ms) * 1000;
        let poll_us = self.config.poll_interval();
        let mut elapsed_us: u64 = 0;
        loop {
            if !self.status()?.contains(Status::BUSY) {
                return Ok(());
            }
            if elapsed_us > limit_us {
                warn!("Flash still busy after {}ms", timeout_ms);
                return Err(Error::Timeout);
            }
            self.delay.delay_us(poll_us);
            elapsed_us += u64::from(poll_us);
        }
    }

    /// From datasheet section 8.2.1
    /// The Write Enable instruction sets the Write Enable Latch (WEL) bit
    /// in the Status Register to a 1. The WEL bit must be set prior to every Page Program,
    /// Sector Erase, Block Erase, Chip Erase and Write Status Register instruction.
    ///
    /// The instruction gives no acknowledgement, so the status register is read
    /// back exactly once and [`Error::WriteEnableFailed`] is returned unless
    /// WEL is set.
    pub fn write_enable(&mut self) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.command(&[Opcode::WriteEnable as u8])?;
        let status = self.status()?;
        if status.contains(Status::WEL) {
            Ok(())
        } else {
            warn!("WEL not latched, status {}", status.bits());
            Err(Error::WriteEnableFailed)
        }
    }

    /// Clears the Write Enable Latch. The chip also clears it when a program
    /// or erase finishes, so this is not verified.
    pub fn write_disable(&mut self) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.command(&[Opcode::WriteDisable as u8])
    }

    /// Chip Erase (see datasheet 8.2.17)
    /// The Chip Erase instruction sets all memory within the device to the erased
    /// state of all 1s (FFh).
    ///
    /// On [`Error::Timeout`] the chip may still be erasing and its contents
    /// are unspecified.
    pub fn erase_chip(&mut self) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.wait_for_ready(self.config.ready_timeout_ms)?;
        self.write_enable()?;
        self.command(&[Opcode::ChipErase as u8])?;
        self.wait_for_ready(self.config.chip_erase_timeout_ms)?;
        self.write_disable()
    }

    /// Sector erase (see datasheet 8.2.15)
    /// Sets the 4K sector containing `addr` to all 1s (FFh). The chip ignores
    /// the low 12 address bits.
    pub fn erase_sector(&mut self, addr: u32) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.check_bounds(addr)?;
        self.wait_for_ready(self.config.ready_timeout_ms)?;
        self.write_enable()?;
        self.command(&address_command(Opcode::SectorErase, addr))?;
        self.wait_for_ready(self.config.sector_erase_timeout_ms)?;
        self.write_disable()
    }

    /// Page Program (see datasheet 8.2.13)
    /// Programs the whole 256-byte page containing `addr`. The low address
    /// byte sent to the chip is always 0, so all 256 bytes land in the page
    /// in order. Only previously erased (FFh) bits can be programmed.
    ///
    /// The program cycle starts when chip select is released; the driver then
    /// sleeps for the configured settle time before polling BUSY.
    pub fn write_page(
        &mut self,
        addr: u32,
        data: &[u8; PAGE_SIZE],
    ) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.check_bounds(addr)?;
        self.wait_for_ready(self.config.ready_timeout_ms)?;
        self.write_enable()?;

        let header = address_command(Opcode::PageProg, addr & !0xFF);
        self.transaction(|transport| {
            for byte in header.iter().chain(data.iter()) {
                transport.exchange_byte(*byte)?;
            }
            Ok(())
        })?;

        self.delay.delay_us(self.config.page_program_settle_us);
        self.wait_for_ready(self.config.ready_timeout_ms)?;
        self.write_disable()
    }

    /// Read Data (see datasheet 8.2.6)
    /// Starts a streaming read at `addr` and leaves the chip selected.
    ///
    /// Fetch bytes with [`read_next_byte`](Self::read_next_byte) and finish
    /// with [`end_read`](Self::end_read). Until then every other operation
    /// fails with [`Error::ReadInProgress`]. On failure the chip is left
    /// deselected.
    pub fn begin_read(&mut self, addr: u32) -> Result<(), Error<T::Error>> {
        self.idle()?;
        self.check_bounds(addr)?;
        self.wait_for_ready(self.config.ready_timeout_ms)?;

        self.transport.select().map_err(Error::Transport)?;
        let header = address_command(Opcode::Read, addr);
        for byte in header {
            if let Err(e) = self.transport.exchange_byte(byte) {
                if self.transport.deselect().is_err() {
                    warn!("Deselect failed after aborted read header");
                }
                return Err(Error::Transport(e));
            }
        }
        self.read_active = true;
        trace!("Streaming read from {}", addr);
        Ok(())
    }

    /// Clocks out the next byte of a streaming read. The chip advances its
    /// address by itself; reading past the end of the device is not checked.
    pub fn read_next_byte(&mut self) -> Result<u8, Error<T::Error>> {
        if !self.read_active {
            warn!("read_next_byte without begin_read");
            return Err(Error::NoReadInProgress);
        }
        self.transport.exchange_byte(0).map_err(Error::Transport)
    }

    /// Ends a streaming read by deselecting the chip. Always deselects, even
    /// when no read is active.
    pub fn end_read(&mut self) -> Result<(), Error<T::Error>> {
        self.read_active = false;
        self.transport.deselect().map_err(Error::Transport)
    }

    /// Reads `buf.len()` bytes starting at `addr` in one streaming read.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<T::Error>> {
        self.idle()?;
        let end = u64::from(addr) + buf.len() as u64;
        if end > u64::from(self.capacity) {
            return Err(Error::OutOfBounds {
                address: addr,
                capacity: self.capacity,
            });
        }
        self.begin_read(addr)?;
        let mut result = Ok(());
        for byte in buf.iter_mut() {
            match self.read_next_byte() {
                Ok(b) => *byte = b,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let ended = self.end_read();
        result.and(ended)
    }

    fn idle(&self) -> Result<(), Error<T::Error>> {
        if self.read_active {
            warn!("Operation issued during a streaming read");
            return Err(Error::ReadInProgress);
        }
        Ok(())
    }

    fn check_bounds(&self, addr: u32) -> Result<(), Error<T::Error>> {
        if addr < self.capacity {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                address: addr,
                capacity: self.capacity,
            })
        }
    }

    /// Runs `f` with the chip selected and always deselects afterwards.
    fn transaction<F>(&mut self, f: F) -> Result<(), Error<T::Error>>
    where
        F: FnOnce(&mut T) -> Result<(), T::Error>,
    {
        self.transport.select().map_err(Error::Transport)?;
        let result = f(&mut self.transport);
        let deselected = self.transport.deselect();
        result.and(deselected).map_err(Error::Transport)
    }

    /// Writes a command to the bus
    fn command(&mut self, bytes: &[u8]) -> Result<(), Error<T::Error>> {
        self.transaction(|transport| {
            for byte in bytes {
                transport.exchange_byte(*byte)?;
            }
            Ok(())
        })
    }

    /// Writes a command and then clocks in `response.len()` bytes
    fn command_with_response(
        &mut self,
        instruction: &[u8],
        response: &mut [u8],
    ) -> Result<(), Error<T::Error>> {
        self.transaction(|transport| {
            for byte in instruction {
                transport.exchange_byte(*byte)?;
            }
            for byte in response.iter_mut() {
                *byte = transport.exchange_byte(0)?;
            }
            Ok(())
        })
    }

    fn status(&mut self) -> Result<Status, Error<T::Error>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[Opcode::ReadStatus as u8], &mut response)?;
        Ok(Status::from_bits_retain(response[0]))
    }
}

impl<T, D> ErrorType for W25Flash<T, D>
where
    T: Transport,
    T::Error: Debug,
    D: DelayNs,
{
    type Error = Error<T::Error>;
}

impl<T, D> ReadNorFlash for W25Flash<T, D>
where
    T: Transport,
    T::Error: Debug,
    D: DelayNs,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        W25Flash::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.capacity as usize
    }
}

impl<T, D> NorFlash for W25Flash<T, D>
where
    T: Transport,
    T::Error: Debug,
    D: DelayNs,
{
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    /// Erases every sector in `from..to`. Both ends must be sector aligned.
    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let sector = SECTOR_SIZE as u32;
        if from > to || from % sector != 0 || to % sector != 0 {
            return Err(Error::NotAligned);
        }
        if to > self.capacity {
            return Err(Error::OutOfBounds {
                address: to - 1,
                capacity: self.capacity,
            });
        }
        for addr in (from..to).step_by(SECTOR_SIZE) {
            self.erase_sector(addr)?;
        }
        Ok(())
    }

    /// Programs exactly one page. Anything other than a single page-aligned
    /// page is rejected with [`Error::NotAligned`].
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if offset % PAGE_SIZE as u32 != 0 {
            return Err(Error::NotAligned);
        }
        let page: &[u8; PAGE_SIZE] = bytes.try_into().map_err(|_| Error::NotAligned)?;
        self.write_page(offset, page)
    }
}

/// Instruction byte followed by the 24-bit address, most significant byte first.
fn address_command(opcode: Opcode, addr: u32) -> [u8; 4] {
    [
        opcode as u8,
        (addr >> 16) as u8,
        (addr >> 8) as u8,
        addr as u8,
    ]
}
