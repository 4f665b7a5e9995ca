//! JEDEC identification and the W25Qxx capacity table.

/// Winbond manufacturer ID.
pub const WINBOND: u8 = 0xEF;

/// Known `(24-bit JEDEC ID, capacity in bytes)` pairs.
const CAPACITIES: [(u32, u32); 5] = [
    // W25Q80
    (0xEF4014, 1024 * 1024),
    // W25Q16
    (0xEF4015, 2 * 1024 * 1024),
    // W25Q32
    (0xEF4016, 4 * 1024 * 1024),
    // W25Q64
    (0xEF4017, 8 * 1024 * 1024),
    // W25Q128
    (0xEF4018, 16 * 1024 * 1024),
];

/// The three bytes returned by the Read JEDEC ID instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identification {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity_code: u8,
}

impl Identification {
    pub fn from_jedec_id(id: &[u8; 3]) -> Self {
        Self {
            manufacturer: id[0],
            memory_type: id[1],
            capacity_code: id[2],
        }
    }

    /// Manufacturer, memory type and capacity code packed as `0xMMTTCC`.
    pub fn jedec_id(&self) -> u32 {
        (u32::from(self.manufacturer) << 16)
            | (u32::from(self.memory_type) << 8)
            | u32::from(self.capacity_code)
    }

    /// Capacity in bytes, or 0 for a device not in the table.
    pub fn capacity(&self) -> u32 {
        capacity_for(self.jedec_id())
    }
}

/// Maps a 24-bit JEDEC ID to a capacity in bytes; unknown IDs map to 0.
pub fn capacity_for(jedec_id: u32) -> u32 {
    CAPACITIES
        .iter()
        .find(|(id, _)| *id == jedec_id)
        .map_or(0, |(_, capacity)| *capacity)
}
