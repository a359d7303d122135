//! Flash session and engines
//!
//! This module holds the session object that owns the bus for the duration
//! of a download, together with the geometry and timing configuration it
//! runs against.

mod config;
mod geometry;
#[cfg(test)]
pub(crate) mod mock;
mod observer;
mod session;

pub use config::{SessionConfig, Timeouts};
pub use geometry::FlashGeometry;
pub use observer::{NoObserver, Operation, OperationObserver};
pub use session::{FlashSession, VerifyOutcome};

use crate::error::Error;

/// Lifecycle state of the bus/device pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusMode {
    /// Nothing has been brought up yet
    #[default]
    Uninitialized,
    /// Indirect mode: ready for explicit commands
    Command,
    /// A program or erase was issued and has not been seen to complete
    Busy,
    /// Continuous fast-read mode: flash contents readable as memory
    MemoryMapped,
}

/// Function code passed by the host to Init and UnInit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Function {
    /// Erase phase
    Erase = 1,
    /// Program phase
    Program = 2,
    /// Verify phase
    Verify = 3,
}

impl TryFrom<u32> for Function {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Erase),
            2 => Ok(Self::Program),
            3 => Ok(Self::Verify),
            other => Err(Error::InvalidFunction(other)),
        }
    }
}
