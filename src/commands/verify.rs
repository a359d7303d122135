//! Verify command implementation

use std::fs;
use std::path::Path;

use qflash_core::bus::QspiBus;
use qflash_core::flash::VerifyOutcome;

use super::{absolute, Session, CHUNK_SIZE};

/// Run the verify command
pub fn run_verify<B: QspiBus>(
    session: &mut Session<B>,
    input: &Path,
    offset: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let expected = fs::read(input)?;
    println!("Read {} bytes from {:?}", expected.len(), input);

    let capacity = session.geometry().capacity;
    let start = absolute(session.base(), capacity, offset, expected.len())?;
    verify_with_progress(session, start, &expected)?;

    let remaining = capacity as usize - offset as usize - expected.len();
    if remaining > 0 {
        println!(
            "Note: Remaining {} bytes after the file were not verified.",
            remaining
        );
    }

    println!("Verification passed!");
    Ok(())
}

/// Verify flash contents at an absolute address with a progress bar
pub fn verify_with_progress<B: QspiBus>(
    session: &mut Session<B>,
    start: u32,
    expected: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    session
        .observer_mut()
        .start_bar(expected.len() as u64, "Verifying");

    let mut address = start;
    for chunk in expected.chunks(CHUNK_SIZE) {
        match session.verify(address, chunk) {
            Ok(VerifyOutcome::Match { end }) => address = end,
            Ok(VerifyOutcome::Mismatch {
                address,
                expected,
                found,
            }) => {
                session.observer_mut().abandon("Verification failed!");
                return Err(format!(
                    "Verification failed at 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
                    address, expected, found
                )
                .into());
            }
            Err(e) => {
                session.observer_mut().abandon("Verification failed!");
                return Err(e.into());
            }
        }
    }

    session.observer_mut().finish("Verification passed");
    Ok(())
}
