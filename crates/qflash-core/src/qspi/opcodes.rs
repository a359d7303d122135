//! W25Q64JV instruction set
//!
//! The subset of the Winbond W25Q64JV command set used by the
//! programming algorithm. The Quad Enable bit is factory-set on this part,
//! so quad reads work straight out of reset.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any program/erase operation
pub const WREN: u8 = 0x06;

// ============================================================================
// Status register
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;

/// Status Register 1: Write In Progress / Busy
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer + memory type + capacity)
pub const RDID: u8 = 0x9F;
/// Read Manufacturer / Device ID
pub const REMS: u8 = 0x90;
/// Read Unique ID Number
pub const RDUID: u8 = 0x4B;

// ============================================================================
// Read / program
// ============================================================================

/// Fast Read Quad I/O (1-4-4)
pub const QIOR: u8 = 0xEB;
/// Page Program with 3-byte address
pub const PP: u8 = 0x02;

/// Mode bits sent as the alternate byte of a Fast Read Quad I/O.
/// `M5-4 = 10` keeps the device in continuous read mode.
pub const QIOR_CONTINUOUS_MODE: u8 = 0xF0;
/// Dummy cycles following the mode byte of a Fast Read Quad I/O
pub const QIOR_DUMMY_CYCLES: u8 = 4;
/// Dummy cycles between address and data of a Read Unique ID
pub const RDUID_DUMMY_CYCLES: u8 = 32;

// ============================================================================
// Erase
// ============================================================================

/// Sector Erase 4KB with 3-byte address
pub const SE_20: u8 = 0x20;
/// Block Erase 64KB with 3-byte address
pub const BE_D8: u8 = 0xD8;
/// Chip Erase
pub const CE_C7: u8 = 0xC7;

// ============================================================================
// Software reset
// ============================================================================

/// Enable Reset
pub const RSTEN: u8 = 0x66;
/// Reset Device
pub const RST: u8 = 0x99;
