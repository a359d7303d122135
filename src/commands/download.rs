//! Download command implementation
//!
//! Replays the call sequence a debug probe issues against a programming
//! algorithm: one Init/UnInit pair per phase, sector erases, page-sized
//! programs and a final Verify, each answered with a bare status code.

use std::fs;
use std::path::Path;

use qflash_core::algo::{FlashAlgo, STATUS_OK};
use qflash_core::bus::QspiBus;
use qflash_core::flash::Function;

use super::absolute;
use crate::progress::ProgressObserver;

/// Turn a status code into an error naming the call that failed
fn check(status: i32, call: &str) -> Result<(), Box<dyn std::error::Error>> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(format!("{} returned {}", call, status).into())
    }
}

/// Run the download command
pub fn run_download<B: QspiBus>(
    algo: &mut FlashAlgo<B, ProgressObserver>,
    base: u32,
    clock_hz: u32,
    input: &Path,
    offset: u32,
    chip_erase: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = fs::read(input)?;
    println!("Read {} bytes from {:?}", image.len(), input);

    let geometry = *algo.session().geometry();
    let start = absolute(base, geometry.capacity, offset, image.len())?;
    let size = image.len() as u32;

    // Erase phase
    check(
        algo.init(base, clock_hz, Function::Erase as u32),
        "Init(erase)",
    )?;
    if chip_erase {
        algo.session_mut()
            .observer_mut()
            .start_spinner("Erasing chip...".to_string());
        let status = algo.erase_chip();
        algo.session_mut().observer_mut().finish("Chip erased");
        check(status, "EraseChip")?;
    } else if size > 0 {
        let first = start - (start - base) % geometry.sector_size;
        let end = start + size;
        algo.session_mut()
            .observer_mut()
            .start_bar(u64::from(end - first), "Erasing");
        let mut sector = first;
        while sector < end {
            check(algo.erase_sector(sector), "EraseSector")?;
            sector += geometry.sector_size;
        }
        algo.session_mut().observer_mut().finish("Erase complete");
        check(algo.blank_check(first, sector - first, 0xFF), "BlankCheck")?;
    }
    check(algo.uninit(Function::Erase as u32), "UnInit(erase)")?;

    // Program phase
    check(
        algo.init(base, clock_hz, Function::Program as u32),
        "Init(program)",
    )?;
    algo.session_mut()
        .observer_mut()
        .start_bar(image.len() as u64, "Programming");
    let mut address = start;
    let mut remaining = &image[..];
    while !remaining.is_empty() {
        let to_page_end = geometry.bytes_to_page_end(address - base) as usize;
        let chunk = to_page_end.min(remaining.len());
        let (page, rest) = remaining.split_at(chunk);
        check(
            algo.program_page(address, page.len() as u32, page),
            "ProgramPage",
        )?;
        address += chunk as u32;
        remaining = rest;
    }
    algo.session_mut()
        .observer_mut()
        .finish("Programming complete");
    check(algo.uninit(Function::Program as u32), "UnInit(program)")?;

    // Verify phase
    check(
        algo.init(base, clock_hz, Function::Verify as u32),
        "Init(verify)",
    )?;
    let reached = algo.verify(start, size, &image);
    if reached != start + size {
        return Err(format!(
            "Verify returned 0x{:08X}, expected 0x{:08X}",
            reached,
            start + size
        )
        .into());
    }
    check(algo.uninit(Function::Verify as u32), "UnInit(verify)")?;

    println!("Downloaded {} bytes to 0x{:08X}", image.len(), start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflash_core::flash::{BusMode, FlashSession, SessionConfig};
    use qflash_emu::EmulatedW25q;
    use std::path::PathBuf;

    const BASE: u32 = 0x9000_0000;

    fn write_input(name: &str, data: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("qflash-{}-{}", std::process::id(), name));
        fs::write(&path, data).unwrap();
        path
    }

    fn algo(flash: &mut EmulatedW25q) -> FlashAlgo<&mut EmulatedW25q, ProgressObserver> {
        let session =
            FlashSession::with_observer(flash, SessionConfig::default(), ProgressObserver::new())
                .unwrap();
        FlashAlgo::from_session(session)
    }

    #[test]
    fn test_download_unaligned_image() {
        let image: Vec<u8> = (0..5000u32).map(|i| (i % 241) as u8).collect();
        let input = write_input("unaligned.bin", &image);

        let mut flash = EmulatedW25q::new_default();
        flash.data_mut()[..0x4000].fill(0x00);
        {
            let mut algo = algo(&mut flash);
            run_download(&mut algo, BASE, 1_000_000, &input, 0x1010, false).unwrap();
            assert_eq!(algo.session().mode(), BusMode::MemoryMapped);
        }

        assert_eq!(&flash.data()[0x1010..0x1010 + image.len()], &image[..]);
        // Covered sectors were erased, the untouched one below was not
        assert!(flash.data()[0x1000..0x1010].iter().all(|&b| b == 0xFF));
        assert!(flash.data()[0x0000..0x1000].iter().all(|&b| b == 0x00));
        fs::remove_file(&input).unwrap();
    }

    #[test]
    fn test_download_with_chip_erase() {
        let input = write_input("chip.bin", &[0xA5; 300]);
        let mut flash = EmulatedW25q::new_default();
        flash.data_mut()[0x7F_0000] = 0x00;
        run_download(&mut algo(&mut flash), BASE, 1_000_000, &input, 0, true).unwrap();

        assert_eq!(&flash.data()[..300], &[0xA5; 300][..]);
        assert_eq!(flash.data()[0x7F_0000], 0xFF);
        fs::remove_file(&input).unwrap();
    }

    #[test]
    fn test_download_reports_failed_call() {
        let input = write_input("failing.bin", &[0x00; 16]);
        let mut flash = EmulatedW25q::new_default();
        flash.faults_mut().fail_instruction = Some(qflash_core::qspi::opcodes::PP);

        let err = run_download(&mut algo(&mut flash), BASE, 1_000_000, &input, 0, false)
            .unwrap_err();
        assert!(err.to_string().contains("ProgramPage"));
        fs::remove_file(&input).unwrap();
    }

    #[test]
    fn test_download_rejects_oversized_image() {
        let input = write_input("oversized.bin", &[0x00; 16]);
        let mut flash = EmulatedW25q::new_default();
        let result = run_download(&mut algo(&mut flash), BASE, 1, &input, 0x7F_FFF8, false);
        assert!(result.is_err());
        assert!(flash.transactions().is_empty());
        fs::remove_file(&input).unwrap();
    }
}
