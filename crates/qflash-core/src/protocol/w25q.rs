//! W25Q64JV protocol implementation
//!
//! Every mutating sequence follows the same shape: Write Enable, wait for
//! the write enable latch, issue the command, then wait for the busy bit to
//! clear. The device clears WEL by itself after each program or erase, so
//! the whole sequence is repeated per page and per erase unit.

use log::{debug, trace};

use crate::bus::{BusCapabilities, QspiBus};
use crate::error::{Error, Result};
use crate::flash::{BusMode, Timeouts};
use crate::qspi::{check_io_mode_supported, AutoPollMatch, QspiCommand};

/// Read a status register with the given instruction
pub fn read_status<B: QspiBus + ?Sized>(bus: &mut B, instruction: u8) -> Result<u8> {
    let mut buf = [0u8; 1];
    let mut cmd = QspiCommand::read_status(&mut buf);
    cmd.instruction = instruction;
    bus.execute(&mut cmd)?;
    Ok(buf[0])
}

/// Sample a status register until `cond` holds
///
/// The number of samples is `timeout_us / interval_us` (at least one).
/// `None` polls until the condition holds, however long that takes.
/// Without `stop_on_match` the poller keeps sampling until the deadline
/// and reports the last sample.
pub fn poll_status<B: QspiBus + ?Sized>(
    bus: &mut B,
    cond: &AutoPollMatch,
    timeout_us: Option<u32>,
) -> Result<()> {
    let max_samples = timeout_us.map(|timeout| {
        let samples = if cond.interval_us > 0 {
            timeout / cond.interval_us
        } else {
            timeout
        };
        samples.max(1)
    });
    let stop_on_match = cond.stop_on_match || max_samples.is_none();

    let mut samples = 0u32;
    let mut matched = false;
    while max_samples.map_or(true, |max| samples < max) {
        let status = read_status(bus, cond.instruction)?;
        samples += 1;
        matched = cond.matches(status);
        trace!(
            "poll 0x{:02X}: status=0x{:02X} mask=0x{:02X} matched={}",
            cond.instruction,
            status,
            cond.mask,
            matched
        );
        if matched && stop_on_match {
            return Ok(());
        }
        if cond.interval_us > 0 {
            bus.delay_us(cond.interval_us);
        }
    }

    if matched {
        Ok(())
    } else {
        debug!(
            "poll 0x{:02X} expecting 0x{:02X}/0x{:02X} gave up after {} samples",
            cond.instruction, cond.expected, cond.mask, samples
        );
        Err(Error::Timeout)
    }
}

/// Wait for the busy bit to clear
pub fn wait_ready<B: QspiBus + ?Sized>(
    bus: &mut B,
    interval_us: u32,
    timeout_us: Option<u32>,
) -> Result<()> {
    let cond = AutoPollMatch::ready().with_interval_us(interval_us);
    poll_status(bus, &cond, timeout_us)
}

/// Send Write Enable and wait for the write enable latch
pub fn write_enable<B: QspiBus + ?Sized>(bus: &mut B, timeouts: &Timeouts) -> Result<()> {
    let mut cmd = QspiCommand::write_enable();
    bus.execute(&mut cmd)?;

    let cond = AutoPollMatch::write_enabled().with_interval_us(timeouts.poll_interval_us);
    poll_status(bus, &cond, Some(timeouts.command_us))
}

/// Send the software reset sequence and wait for the device
pub fn software_reset<B: QspiBus + ?Sized>(bus: &mut B, timeouts: &Timeouts) -> Result<()> {
    let mut cmd = QspiCommand::enable_reset();
    bus.execute(&mut cmd)?;
    let mut cmd = QspiCommand::reset_device();
    bus.execute(&mut cmd)?;
    wait_ready(bus, timeouts.poll_interval_us, Some(timeouts.command_us))
}

/// Program a single page
///
/// The data must not cross a page boundary: the device wraps around
/// inside the page instead of moving on to the next one.
pub fn program_page<B: QspiBus + ?Sized>(
    bus: &mut B,
    addr: u32,
    data: &[u8],
    timeouts: &Timeouts,
) -> Result<()> {
    write_enable(bus, timeouts)?;

    debug!("PP 0x{:06X} len={}", addr, data.len());
    let mut cmd = QspiCommand::page_program(addr, data);
    bus.execute(&mut cmd)?;

    wait_ready(
        bus,
        timeouts.poll_interval_us,
        Some(timeouts.page_program_us),
    )
}

/// Erase the 4KB sector containing `addr`
pub fn erase_sector<B: QspiBus + ?Sized>(
    bus: &mut B,
    addr: u32,
    timeouts: &Timeouts,
) -> Result<()> {
    write_enable(bus, timeouts)?;

    debug!("SE 0x{:06X}", addr);
    let mut cmd = QspiCommand::sector_erase(addr);
    bus.execute(&mut cmd)?;

    wait_ready(
        bus,
        timeouts.erase_poll_interval_us,
        Some(timeouts.sector_erase_us),
    )
}

/// Erase the 64KB block containing `addr`
pub fn erase_block<B: QspiBus + ?Sized>(
    bus: &mut B,
    addr: u32,
    timeouts: &Timeouts,
) -> Result<()> {
    write_enable(bus, timeouts)?;

    debug!("BE 0x{:06X}", addr);
    let mut cmd = QspiCommand::block_erase(addr);
    bus.execute(&mut cmd)?;

    wait_ready(
        bus,
        timeouts.erase_poll_interval_us,
        Some(timeouts.block_erase_us),
    )
}

/// Erase the entire chip
///
/// Chip erase takes tens of seconds on this part; the wait may be
/// configured without a deadline.
pub fn chip_erase<B: QspiBus + ?Sized>(bus: &mut B, timeouts: &Timeouts) -> Result<()> {
    write_enable(bus, timeouts)?;

    debug!("CE");
    let mut cmd = QspiCommand::chip_erase();
    bus.execute(&mut cmd)?;

    wait_ready(bus, timeouts.erase_poll_interval_us, timeouts.chip_erase_us)
}

/// Switch the controller to memory-mapped Fast Read Quad I/O
///
/// No timeout counter is armed: the mapping stays active until the next
/// command-mode transaction or abort.
pub fn enable_memory_mapped<B: QspiBus + ?Sized>(bus: &mut B) -> Result<()> {
    let failure = Error::ModeTransitionFailure {
        target: BusMode::MemoryMapped,
    };
    let cmd = QspiCommand::fast_read_quad_mapped();

    if !bus.capabilities().contains(BusCapabilities::MEMORY_MAPPED) {
        return Err(failure);
    }
    check_io_mode_supported(cmd.io_mode, cmd.instruction, bus.capabilities())
        .map_err(|_| failure)?;

    bus.enable_memory_mapped(&cmd).map_err(|e| {
        debug!("memory-mapped setup failed: {}", e);
        failure
    })
}

/// Read the manufacturer and device ID
pub fn read_device_id<B: QspiBus + ?Sized>(bus: &mut B) -> Result<(u8, u8)> {
    let mut buf = [0u8; 2];
    let mut cmd = QspiCommand::read_device_id(&mut buf);
    bus.execute(&mut cmd)?;
    Ok((buf[0], buf[1]))
}

/// Read the JEDEC ID
///
/// Returns (manufacturer_id, device_id) where device_id is the memory
/// type and capacity bytes combined.
pub fn read_jedec_id<B: QspiBus + ?Sized>(bus: &mut B) -> Result<(u8, u16)> {
    let mut buf = [0u8; 3];
    let mut cmd = QspiCommand::read_jedec_id(&mut buf);
    bus.execute(&mut cmd)?;
    Ok((buf[0], u16::from_be_bytes([buf[1], buf[2]])))
}

/// Read the 64-bit factory unique ID
pub fn read_unique_id<B: QspiBus + ?Sized>(bus: &mut B) -> Result<[u8; 8]> {
    let mut buf = [0u8; 8];
    let mut cmd = QspiCommand::read_unique_id(&mut buf);
    bus.execute(&mut cmd)?;
    Ok(buf)
}
