//! Blank-check command implementation

use qflash_core::bus::QspiBus;

use super::{absolute, length_or_rest, Session};

/// Bytes checked per call; each call re-initializes the device afterwards
const BLANK_CHECK_CHUNK: u32 = 0x1_0000;

/// Run the blank-check command
pub fn run_blank_check<B: QspiBus>(
    session: &mut Session<B>,
    offset: u32,
    length: Option<u32>,
    pattern: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let capacity = session.geometry().capacity;
    let length = length_or_rest(capacity, offset, length);
    let start = absolute(session.base(), capacity, offset, length as usize)?;

    session
        .observer_mut()
        .start_bar(u64::from(length), "Blank checking");

    let end = start + length;
    let mut address = start;
    while address < end {
        let size = BLANK_CHECK_CHUNK.min(end - address);
        match session.blank_check(address, size, pattern) {
            Ok(true) => address += size,
            Ok(false) => {
                session.observer_mut().abandon("Not blank");
                return Err(format!(
                    "Range 0x{:08X}..0x{:08X} holds bytes other than 0x{:02X}",
                    address,
                    address + size,
                    pattern
                )
                .into());
            }
            Err(e) => {
                session.observer_mut().abandon("Blank check failed");
                return Err(e.into());
            }
        }
    }

    session.observer_mut().finish("Blank");
    println!(
        "{} bytes at 0x{:08X} hold only 0x{:02X}",
        length, start, pattern
    );
    Ok(())
}
