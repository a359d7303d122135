//! QSPI types and command structures
//!
//! This module provides types for representing quad-SPI transactions,
//! line-width modes, status auto-polling and the W25Q64JV opcodes.

mod address;
mod command;
mod io_mode;
pub mod opcodes;
mod poll;

pub use address::AddressWidth;
pub use command::QspiCommand;
pub use io_mode::{check_io_mode_supported, IoMode};
pub use opcodes::*;
pub use poll::{AutoPollMatch, MatchMode};
