//! Minimal driver for Winbond W25Qxx serial NOR flash (W25Q80 to W25Q128).
//!
//! Provides chip and sector erase, whole-page program and a streaming
//! sequential read that needs no driver-side buffer. Anything larger, such as
//! buffered or unaligned writes, is meant to be layered on top through the
//! `embedded-storage` [`NorFlash`](embedded_storage::nor_flash::NorFlash)
//! implementation.
//!
//! ```ignore
//! let transport = SpiTransport::new(spi_bus, cs_pin);
//! let mut flash = W25Flash::new(transport, delay);
//! let capacity = flash.begin()?;
//!
//! flash.erase_sector(0)?;
//! flash.write_page(0, &[0x55; PAGE_SIZE])?;
//!
//! flash.begin_read(0)?;
//! let first = flash.read_next_byte()?;
//! flash.end_read()?;
//! ```
#![no_std]

mod fmt;

pub mod comms;
pub mod config;
pub mod error;
pub mod identification;
pub mod traits;
pub mod transport;

pub use comms::{Status, W25Flash};
pub use config::{Config, PAGE_SIZE, SECTOR_SIZE};
pub use error::Error;
pub use identification::Identification;
pub use traits::Transport;
pub use transport::{SpiTransport, TransportError};
