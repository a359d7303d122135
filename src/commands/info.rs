//! Info command implementation

use qflash_core::bus::QspiBus;

use super::Session;

/// Print device identification and geometry
pub fn run_info<B: QspiBus>(session: &mut Session<B>) -> Result<(), Box<dyn std::error::Error>> {
    let (manufacturer, device) = session.read_device_id()?;
    let (jedec_manufacturer, jedec_device) = session.read_jedec_id()?;
    let unique_id = session.read_unique_id()?;
    let geometry = *session.geometry();

    println!("Flash device:");
    println!(
        "  Manufacturer/Device ID: {:02X} {:02X}",
        manufacturer, device
    );
    println!(
        "  JEDEC ID:  {:02X} {:04X}",
        jedec_manufacturer, jedec_device
    );
    print!("  Unique ID: ");
    for byte in unique_id {
        print!("{:02X}", byte);
    }
    println!();
    println!(
        "  Size:      {} bytes ({} KiB)",
        geometry.capacity,
        geometry.capacity / 1024
    );
    println!(
        "  Mapped at: 0x{:08X}..0x{:08X}",
        session.base(),
        session.base() as u64 + geometry.capacity as u64
    );
    println!(
        "  Erase:     {} B sectors, {} KiB blocks",
        geometry.sector_size,
        geometry.block_size / 1024
    );
    println!(
        "  Program:   {} B pages ({} pages)",
        geometry.page_size,
        geometry.page_count()
    );

    Ok(())
}
