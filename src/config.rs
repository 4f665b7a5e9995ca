/// Size of a program page in bytes.
pub const PAGE_SIZE: usize = 256;
/// Size of the smallest erasable sector in bytes.
pub const SECTOR_SIZE: usize = 4096;

/// Timing used by the protocol engine.
///
/// Timeouts bound the busy-poll loops only; the chip has no abort command,
/// so an operation that times out is still running inside the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Busy-wait before reads, writes and erases.
    pub ready_timeout_ms: u32,
    /// Sector erase completion (datasheet tSE max is 400ms).
    pub sector_erase_timeout_ms: u32,
    /// Chip erase completion (datasheet tCE max is several seconds).
    pub chip_erase_timeout_ms: u32,
    /// Sleep after a page program before polling BUSY (tPP max is 3ms).
    pub page_program_settle_us: u32,
    /// Sleep between two status register reads.
    pub poll_interval_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 100,
            sector_erase_timeout_ms: 1_000,
            chip_erase_timeout_ms: 10_000,
            page_program_settle_us: 3_000,
            poll_interval_us: 100,
        }
    }
}

impl Config {
    pub fn with_ready_timeout_ms(mut self, ms: u32) -> Self {
        self.ready_timeout_ms = ms;
        self
    }

    pub fn with_sector_erase_timeout_ms(mut self, ms: u32) -> Self {
        self.sector_erase_timeout_ms = ms;
        self
    }

    pub fn with_chip_erase_timeout_ms(mut self, ms: u32) -> Self {
        self.chip_erase_timeout_ms = ms;
        self
    }

    pub fn with_page_program_settle_us(mut self, us: u32) -> Self {
        self.page_program_settle_us = us;
        self
    }

    /// A zero interval is treated as 1µs so that polling always advances time.
    pub fn with_poll_interval_us(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    pub(crate) fn poll_interval(&self) -> u32 {
        self.poll_interval_us.max(1)
    }
}
