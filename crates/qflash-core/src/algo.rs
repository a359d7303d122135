//! Host-facing programming algorithm entry points
//!
//! A debug probe drives a download through a fixed set of calls that only
//! understand integers: 0 for success, 1 for failure, and an address for
//! Verify. [`FlashAlgo`] adapts a [`FlashSession`] to that contract. Every
//! error is logged here and then collapsed into the status code.

use log::error;

use crate::bus::QspiBus;
use crate::error::{Error, Result};
use crate::flash::{
    FlashSession, Function, NoObserver, OperationObserver, SessionConfig, VerifyOutcome,
};

/// Status returned on success
pub const STATUS_OK: i32 = 0;
/// Status returned on failure
pub const STATUS_FAILED: i32 = 1;

/// Programming algorithm bound to one bus
pub struct FlashAlgo<B: QspiBus, O: OperationObserver = NoObserver> {
    session: FlashSession<B, O>,
}

impl<B: QspiBus> FlashAlgo<B, NoObserver> {
    /// Create the algorithm for `bus`
    pub fn new(bus: B, config: SessionConfig) -> Result<Self> {
        Ok(Self {
            session: FlashSession::new(bus, config)?,
        })
    }
}

impl<B: QspiBus, O: OperationObserver> FlashAlgo<B, O> {
    /// Wrap an existing session
    pub fn from_session(session: FlashSession<B, O>) -> Self {
        Self { session }
    }

    /// Borrow the underlying session
    pub fn session(&self) -> &FlashSession<B, O> {
        &self.session
    }

    /// Mutably borrow the underlying session
    pub fn session_mut(&mut self) -> &mut FlashSession<B, O> {
        &mut self.session
    }

    /// Hand the session back
    pub fn into_session(self) -> FlashSession<B, O> {
        self.session
    }

    /// Init: bring up the bus for function `fnc` (1 erase, 2 program, 3 verify)
    pub fn init(&mut self, adr: u32, clk: u32, fnc: u32) -> i32 {
        let result =
            Function::try_from(fnc).and_then(|function| self.session.init(adr, clk, function));
        status("Init", result)
    }

    /// UnInit: end the phase and leave the flash memory-mapped
    pub fn uninit(&mut self, fnc: u32) -> i32 {
        let result = Function::try_from(fnc).and_then(|function| self.session.uninit(function));
        status("UnInit", result)
    }

    /// EraseChip
    pub fn erase_chip(&mut self) -> i32 {
        status("EraseChip", self.session.erase_chip())
    }

    /// EraseSector: erase the sector holding `adr`
    pub fn erase_sector(&mut self, adr: u32) -> i32 {
        status("EraseSector", self.session.erase_sector(adr))
    }

    /// ProgramPage: program the first `sz` bytes of `buf` at `adr`
    pub fn program_page(&mut self, adr: u32, sz: u32, buf: &[u8]) -> i32 {
        let result = prefix(buf, sz).and_then(|data| self.session.program(adr, data));
        status("ProgramPage", result)
    }

    /// Verify: returns `adr + sz` on a full match, the address of the first
    /// differing byte otherwise, and 0 when the check could not run
    pub fn verify(&mut self, adr: u32, sz: u32, buf: &[u8]) -> u32 {
        let result = prefix(buf, sz).and_then(|data| self.session.verify(adr, data));
        match result {
            Ok(VerifyOutcome::Match { end }) => end,
            Ok(VerifyOutcome::Mismatch { address, .. }) => address,
            Err(e) => {
                error!("Verify at 0x{:08X} failed: {}", adr, e);
                0
            }
        }
    }

    /// BlankCheck: 0 if `[adr, adr + sz)` holds only `pat`
    pub fn blank_check(&mut self, adr: u32, sz: u32, pat: u8) -> i32 {
        match self.session.blank_check(adr, sz, pat) {
            Ok(true) => STATUS_OK,
            Ok(false) => STATUS_FAILED,
            Err(e) => {
                error!("BlankCheck at 0x{:08X} failed: {}", adr, e);
                STATUS_FAILED
            }
        }
    }
}

fn prefix(buf: &[u8], sz: u32) -> Result<&[u8]> {
    buf.get(..sz as usize).ok_or(Error::BufferTooSmall)
}

fn status(op: &str, result: Result<()>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!("{} failed: {}", op, e);
            STATUS_FAILED
        }
    }
}
