//! Error types for qflash-core
//!
//! This module provides a no_std compatible error type shared by the
//! protocol engine, the session and the host-facing entry points.

use core::fmt;

use crate::flash::BusMode;

/// Details about a failed bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFailure {
    /// The transport could not complete the transaction
    TransferFailed {
        /// Instruction byte of the failed transaction
        instruction: u8,
    },
    /// The transport itself could not be brought up
    InitFailed,
    /// The transport does not implement the requested instruction
    Unsupported {
        /// Instruction byte that was rejected
        instruction: u8,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus transaction failed
    BusError(BusFailure),
    /// A status poll did not match before its deadline
    Timeout,
    /// Host address is below the configured base or past the device end
    AddressOutOfRange {
        /// The absolute address as issued by the host
        addr: u32,
    },
    /// The bus could not be switched into the requested mode
    ModeTransitionFailure {
        /// Mode the session tried to reach
        target: BusMode,
    },
    /// Operation issued before Init (or after UnInit)
    NotInitialized,
    /// Geometry constants violate the page/sector/block nesting rules
    InvalidGeometry,
    /// Data buffer is shorter than the requested size
    BufferTooSmall,
    /// Function code passed to Init/UnInit is not 1, 2 or 3
    InvalidFunction(u32),
}

impl fmt::Display for BusFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferFailed { instruction } => {
                write!(f, "transfer of instruction 0x{:02X} failed", instruction)
            }
            Self::InitFailed => write!(f, "bus initialization failed"),
            Self::Unsupported { instruction } => {
                write!(f, "instruction 0x{:02X} not supported", instruction)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusError(failure) => write!(f, "bus error: {}", failure),
            Self::Timeout => write!(f, "status poll timed out"),
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} is out of range", addr)
            }
            Self::ModeTransitionFailure { target } => {
                write!(f, "could not switch bus to {:?} mode", target)
            }
            Self::NotInitialized => write!(f, "flash session not initialized"),
            Self::InvalidGeometry => write!(f, "invalid flash geometry"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidFunction(code) => write!(f, "invalid function code {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<BusFailure> for Error {
    fn from(failure: BusFailure) -> Self {
        Self::BusError(failure)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
