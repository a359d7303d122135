//! Session configuration

use super::FlashGeometry;

/// Deadlines for the status polls, in microseconds
///
/// Defaults sit above the W25Q64JV datasheet maximums: page program 3ms,
/// sector erase 400ms, block erase 2s, chip erase 100s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Timeouts {
    /// Delay between status samples for write enable and page program
    pub poll_interval_us: u32,
    /// Delay between status samples while erasing
    pub erase_poll_interval_us: u32,
    /// Deadline for the write enable latch and for reset completion
    pub command_us: u32,
    /// Deadline for one page program
    pub page_program_us: u32,
    /// Deadline for one 4KB sector erase
    pub sector_erase_us: u32,
    /// Deadline for one 64KB block erase
    pub block_erase_us: u32,
    /// Deadline for a chip erase, `None` waits for as long as it takes
    pub chip_erase_us: Option<u32>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_us: 10,
            erase_poll_interval_us: 1_000,
            command_us: 100_000,
            page_program_us: 10_000,
            sector_erase_us: 500_000,
            block_erase_us: 2_000_000,
            chip_erase_us: Some(200_000_000),
        }
    }
}

/// Static configuration of a flash session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Device geometry
    pub geometry: FlashGeometry,
    /// Poll deadlines
    pub timeouts: Timeouts,
    /// Settle time after the software reset, in milliseconds
    pub reset_settle_ms: u32,
    /// Wait before retrying a failed re-initialization, in milliseconds
    pub reinit_retry_delay_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            geometry: FlashGeometry::W25Q64JV,
            timeouts: Timeouts::default(),
            reset_settle_ms: 1,
            reinit_retry_delay_ms: 100,
        }
    }
}
