//! Erase command implementation

use qflash_core::bus::QspiBus;

use super::{absolute, Session};

/// Run the erase command
pub fn run_erase<B: QspiBus>(
    session: &mut Session<B>,
    chip: bool,
    start: Option<u32>,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    match (chip, start, length) {
        (true, _, _) => {
            chip_erase_with_progress(session)?;
            println!("Chip erase complete");
        }
        (false, Some(start), Some(len)) => {
            erase_region_with_progress(session, start, len)?;
            println!("Erased {} bytes starting at 0x{:08X}", len, start);
        }
        (false, Some(_), None) | (false, None, Some(_)) => {
            return Err(
                "Both --start and --length must be specified for partial erase".into(),
            );
        }
        (false, None, None) => {
            return Err("Specify --chip or --start and --length".into());
        }
    }

    Ok(())
}

/// Erase the entire chip with a progress spinner
pub fn chip_erase_with_progress<B: QspiBus>(
    session: &mut Session<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    let total_size = session.geometry().capacity;
    session.observer_mut().start_spinner(format!(
        "Erasing {} bytes (this may take a while)...",
        total_size
    ));

    match session.erase_chip() {
        Ok(()) => {
            session.observer_mut().finish("Chip erased");
            Ok(())
        }
        Err(e) => {
            session.observer_mut().abandon("Chip erase failed");
            Err(e.into())
        }
    }
}

/// Erase every sector overlapping a region, one sector at a time
pub fn erase_region_with_progress<B: QspiBus>(
    session: &mut Session<B>,
    offset: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = *session.geometry();
    let start = absolute(session.base(), geometry.capacity, offset, length as usize)?;
    if length == 0 {
        return Ok(());
    }

    let first = geometry.sector_align_down(offset);
    let sectors = (offset + length - first).div_ceil(geometry.sector_size);
    let total = u64::from(sectors) * u64::from(geometry.sector_size);
    session.observer_mut().start_bar(total, "Erasing");

    // One call per sector keeps the bar moving; the session aligns each one
    let aligned = start - (offset - first);
    for i in 0..sectors {
        let sector = aligned + i * geometry.sector_size;
        if let Err(e) = session.erase_range(sector, geometry.sector_size) {
            session.observer_mut().abandon("Erase failed");
            return Err(e.into());
        }
    }

    session.observer_mut().finish("Erase complete");
    Ok(())
}
