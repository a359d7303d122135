//! Flash geometry constants

use crate::error::{Error, Result};
use crate::qspi::AddressWidth;

/// Erase/program granularities of the flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashGeometry {
    /// Total capacity in bytes
    pub capacity: u32,
    /// Block erase size in bytes
    pub block_size: u32,
    /// Sector erase size in bytes
    pub sector_size: u32,
    /// Page program size in bytes
    pub page_size: u32,
}

impl FlashGeometry {
    /// Winbond W25Q64JV: 64 Mbit, 128 blocks of 16 sectors of 16 pages
    pub const W25Q64JV: Self = Self {
        capacity: 0x80_0000,
        block_size: 0x1_0000,
        sector_size: 0x1000,
        page_size: 0x100,
    };

    /// Check the nesting rules: page | sector | block | capacity, all
    /// powers of two, capacity reachable with 24-bit addresses
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            self.page_size,
            self.sector_size,
            self.block_size,
            self.capacity,
        ];
        if sizes.iter().any(|s| !s.is_power_of_two()) {
            return Err(Error::InvalidGeometry);
        }
        if self.sector_size % self.page_size != 0
            || self.block_size % self.sector_size != 0
            || self.capacity % self.block_size != 0
        {
            return Err(Error::InvalidGeometry);
        }
        if self.capacity > AddressWidth::ThreeByte.max_size() {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    /// Align a device-relative address down to its sector
    pub const fn sector_align_down(&self, addr: u32) -> u32 {
        addr - addr % self.sector_size
    }

    /// Align a device-relative address down to its block
    pub const fn block_align_down(&self, addr: u32) -> u32 {
        addr - addr % self.block_size
    }

    /// Number of bytes from `addr` to the start of the next page
    pub const fn bytes_to_page_end(&self, addr: u32) -> u32 {
        self.page_size - addr % self.page_size
    }

    /// Number of pages in the device
    pub const fn page_count(&self) -> u32 {
        self.capacity / self.page_size
    }

    /// Check that `[addr, addr + len)` lies inside the device
    pub fn contains(&self, addr: u32, len: u32) -> bool {
        addr as u64 + len as u64 <= self.capacity as u64
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::W25Q64JV
    }
}
