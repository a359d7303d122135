//! Program command implementation

use std::fs;
use std::path::Path;

use qflash_core::bus::QspiBus;

use super::erase::erase_region_with_progress;
use super::verify::verify_with_progress;
use super::{absolute, Session, CHUNK_SIZE};

/// Run the program command
pub fn run_program<B: QspiBus>(
    session: &mut Session<B>,
    input: &Path,
    offset: u32,
    erase: bool,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    let capacity = session.geometry().capacity;
    let start = absolute(session.base(), capacity, offset, data.len())?;

    if erase {
        erase_region_with_progress(session, offset, data.len() as u32)?;
    }
    program_with_progress(session, start, &data)?;
    if verify {
        verify_with_progress(session, start, &data)?;
    }

    println!("Programmed {} bytes at 0x{:08X}", data.len(), start);
    Ok(())
}

/// Program `data` at an absolute address with a progress bar
pub fn program_with_progress<B: QspiBus>(
    session: &mut Session<B>,
    start: u32,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    session
        .observer_mut()
        .start_bar(data.len() as u64, "Programming");

    let mut address = start;
    for chunk in data.chunks(CHUNK_SIZE) {
        if let Err(e) = session.program(address, chunk) {
            session.observer_mut().abandon("Programming failed");
            return Err(e.into());
        }
        address += chunk.len() as u32;
    }

    session.observer_mut().finish("Programming complete");
    Ok(())
}
