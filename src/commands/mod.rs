//! CLI command implementations
//!
//! Every command except `download` drives a [`FlashSession`] that `main`
//! has already initialized for the matching phase. Offsets given on the
//! command line are relative to the start of the flash; the session sees
//! absolute addresses built from the configured base.
//!
//! `download` instead goes through [`FlashAlgo`](qflash_core::algo::FlashAlgo)
//! and issues Init/UnInit itself, exactly like a debug probe would.

mod blank_check;
mod download;
mod erase;
mod info;
mod program;
mod read;
mod verify;

pub use blank_check::run_blank_check;
pub use download::run_download;
pub use erase::run_erase;
pub use info::run_info;
pub use program::run_program;
pub use read::run_read;
pub use verify::run_verify;

use qflash_core::flash::FlashSession;

use crate::progress::ProgressObserver;

/// Session type used by the commands
pub type Session<B> = FlashSession<B, ProgressObserver>;

/// Size of the chunks long operations are split into for progress
const CHUNK_SIZE: usize = 4096;

/// Absolute address of `offset`, checked against the device size
fn absolute(
    base: u32,
    capacity: u32,
    offset: u32,
    len: usize,
) -> Result<u32, Box<dyn std::error::Error>> {
    let end = offset as u64 + len as u64;
    if end > capacity as u64 {
        return Err(format!(
            "Range 0x{:08X}..0x{:08X} is outside the flash (0x{:08X} bytes)",
            offset, end, capacity
        )
        .into());
    }
    base.checked_add(offset).ok_or_else(|| {
        format!("Offset 0x{:08X} overflows base 0x{:08X}", offset, base).into()
    })
}

/// Length of the range starting at `offset`, defaulting to the rest of the device
fn length_or_rest(capacity: u32, offset: u32, length: Option<u32>) -> u32 {
    length.unwrap_or_else(|| capacity.saturating_sub(offset))
}
