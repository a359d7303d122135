//! QSPI I/O modes

use crate::bus::BusCapabilities;
use crate::error::{BusFailure, Error, Result};

/// I/O mode for QSPI transactions
///
/// Represents how each phase is transferred on the bus, from single-wire
/// to quad-wire modes. Written as instruction-address-data line counts;
/// the instruction always goes out on one line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IoMode {
    /// Standard SPI: 1-1-1
    #[default]
    Single,
    /// Quad Output: 1-1-4 (data phase on 4 lines)
    QuadOut,
    /// Quad I/O: 1-4-4 (address, alternate bytes and data on 4 lines)
    QuadIo,
}

impl IoMode {
    /// Returns the number of lines used for the address phase
    pub const fn address_lines(&self) -> u8 {
        match self {
            Self::Single | Self::QuadOut => 1,
            Self::QuadIo => 4,
        }
    }

    /// Returns the number of lines used for the data phase
    pub const fn data_lines(&self) -> u8 {
        match self {
            Self::Single => 1,
            Self::QuadOut | Self::QuadIo => 4,
        }
    }
}

/// Check if a bus supports the requested I/O mode
///
/// Returns `Ok(())` if the mode is supported, or an unsupported-instruction
/// bus error otherwise.
pub fn check_io_mode_supported(
    mode: IoMode,
    instruction: u8,
    capabilities: BusCapabilities,
) -> Result<()> {
    let required = match mode {
        IoMode::Single => BusCapabilities::empty(),
        IoMode::QuadOut => BusCapabilities::QUAD_OUT,
        IoMode::QuadIo => BusCapabilities::QUAD_IO,
    };
    if capabilities.contains(required) {
        Ok(())
    } else {
        Err(Error::BusError(BusFailure::Unsupported { instruction }))
    }
}
