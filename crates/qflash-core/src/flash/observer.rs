//! Operation lifecycle notifications
//!
//! Boards that drive activity LEDs, or host tools that show progress,
//! implement [`OperationObserver`]. Notifications are only sent at the
//! start and end of an operation, never from inside a poll loop.

/// Host-visible operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Transport bring-up and device reset
    Init,
    /// Session teardown
    UnInit,
    /// Whole-chip erase
    EraseChip,
    /// Sector or sector-range erase
    EraseSector,
    /// 64KB block erase
    EraseBlock,
    /// Page-split program
    Program,
    /// Compare against expected data
    Verify,
    /// Compare against a fill pattern
    BlankCheck,
    /// Copy out through the mapped view
    Read,
}

/// Callback for operation start/end
pub trait OperationObserver {
    /// Called before the first bus transaction of an operation
    fn started(&mut self, op: Operation, addr: u32, len: u32);

    /// Called after the operation completed or failed
    fn finished(&mut self, op: Operation, ok: bool);
}

/// A no-op observer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl OperationObserver for NoObserver {
    fn started(&mut self, _op: Operation, _addr: u32, _len: u32) {}
    fn finished(&mut self, _op: Operation, _ok: bool) {}
}
