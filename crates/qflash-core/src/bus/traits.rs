//! Bus transport trait definitions

use crate::error::Result;
use crate::qspi::QspiCommand;
use bitflags::bitflags;

bitflags! {
    /// QSPI controller feature flags
    ///
    /// These flags indicate which line widths and modes a controller supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BusCapabilities: u32 {
        /// Can read four bits at once (1-1-4 mode)
        const QUAD_OUT      = 1 << 0;
        /// Can transfer address and data on four lines (1-4-4 mode)
        const QUAD_IO       = 1 << 1;
        /// Can map flash contents into the memory space
        const MEMORY_MAPPED = 1 << 2;

        /// Shorthand for quad mode (both QUAD_OUT and QUAD_IO)
        const QUAD = Self::QUAD_OUT.bits() | Self::QUAD_IO.bits();
    }
}

impl Default for BusCapabilities {
    fn default() -> Self {
        BusCapabilities::empty()
    }
}

/// QSPI transport trait
///
/// This trait represents a controller that can issue single QSPI
/// transactions and map the flash into memory. It owns no protocol
/// knowledge: write-enable, polling and page splitting all live in the
/// [`protocol`](crate::protocol) module.
///
/// ## Example: STM32 QUADSPI peripheral
///
/// ```ignore
/// impl QspiBus for StmQuadSpi {
///     fn capabilities(&self) -> BusCapabilities {
///         BusCapabilities::QUAD | BusCapabilities::MEMORY_MAPPED
///     }
///
///     fn execute(&mut self, cmd: &mut QspiCommand<'_>) -> Result<()> {
///         self.configure_ccr(cmd)?;
///         if cmd.has_write() {
///             self.transmit(cmd.write_data)
///         } else if cmd.has_read() {
///             self.receive(cmd.read_buf)
///         } else {
///             self.wait_transfer_complete()
///         }
///     }
///     // ...
/// }
/// ```
pub trait QspiBus {
    /// Get the features supported by this controller
    fn capabilities(&self) -> BusCapabilities;

    /// Bring the controller up from a zeroed state at the given clock
    ///
    /// Any previous configuration, including memory-mapped mode, is
    /// discarded.
    fn init(&mut self, clock_hz: u32) -> Result<()>;

    /// Execute a single QSPI command and wait for it to complete
    ///
    /// The command contains all the information needed for the transaction:
    /// - `instruction`: The instruction byte
    /// - `address`: Optional address (with width)
    /// - `io_mode`: Line widths of the phases
    /// - `alternate`: Optional alternate byte
    /// - `dummy_cycles`: Number of dummy clock cycles
    /// - `write_data`: Data to write after the header
    /// - `read_buf`: Buffer to read data into
    fn execute(&mut self, cmd: &mut QspiCommand<'_>) -> Result<()>;

    /// Configure the controller to serve memory reads with `cmd`
    ///
    /// After this returns, [`read_mapped`](Self::read_mapped) yields flash
    /// contents without further explicit commands.
    fn enable_memory_mapped(&mut self, cmd: &QspiCommand<'_>) -> Result<()>;

    /// Abort any ongoing transfer, including memory-mapped mode
    fn abort(&mut self) -> Result<()>;

    /// Read one byte of the mapped flash at a device-relative offset
    fn read_mapped(&mut self, offset: u32) -> Result<u8>;

    /// Read consecutive mapped bytes starting at a device-relative offset
    fn read_mapped_into(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_mapped(offset + i as u32)?;
        }
        Ok(())
    }

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Delay for the specified number of milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

// Lets a session borrow a bus that the caller keeps ownership of
impl<B: QspiBus + ?Sized> QspiBus for &mut B {
    fn capabilities(&self) -> BusCapabilities {
        (**self).capabilities()
    }

    fn init(&mut self, clock_hz: u32) -> Result<()> {
        (**self).init(clock_hz)
    }

    fn execute(&mut self, cmd: &mut QspiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn enable_memory_mapped(&mut self, cmd: &QspiCommand<'_>) -> Result<()> {
        (**self).enable_memory_mapped(cmd)
    }

    fn abort(&mut self) -> Result<()> {
        (**self).abort()
    }

    fn read_mapped(&mut self, offset: u32) -> Result<u8> {
        (**self).read_mapped(offset)
    }

    fn read_mapped_into(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_mapped_into(offset, buf)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
