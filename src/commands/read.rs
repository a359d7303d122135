//! Read command implementation

use std::fs::File;
use std::io::Write;
use std::path::Path;

use qflash_core::bus::QspiBus;

use super::{absolute, length_or_rest, Session, CHUNK_SIZE};

/// Run the read command
pub fn run_read<B: QspiBus>(
    session: &mut Session<B>,
    output: &Path,
    offset: u32,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let capacity = session.geometry().capacity;
    let length = length_or_rest(capacity, offset, length) as usize;
    let start = absolute(session.base(), capacity, offset, length)?;

    let data = read_with_progress(session, start, length)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Read `length` bytes at an absolute address with a progress bar
pub fn read_with_progress<B: QspiBus>(
    session: &mut Session<B>,
    start: u32,
    length: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = vec![0u8; length];
    session.observer_mut().start_bar(length as u64, "Reading");

    let mut address = start;
    for chunk in data.chunks_mut(CHUNK_SIZE) {
        if let Err(e) = session.read(address, chunk) {
            session.observer_mut().abandon("Read failed");
            return Err(e.into());
        }
        address += chunk.len() as u32;
    }

    session.observer_mut().finish("Read complete");
    Ok(data)
}
