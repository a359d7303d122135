//! Flash session - the bus/device pair and its lifecycle
//!
//! A [`FlashSession`] owns the bus for as long as the host drives it. Every
//! host address goes through the configured base before it reaches the
//! device, and every operation keeps [`BusMode`] in step with what the
//! controller is actually doing.

use log::{debug, info, warn};

use super::{
    BusMode, FlashGeometry, Function, NoObserver, Operation, OperationObserver, SessionConfig,
};
use crate::bus::QspiBus;
use crate::error::{Error, Result};
use crate::protocol;

/// Result of comparing flash contents against expected data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Every byte matched
    Match {
        /// Absolute address one past the last compared byte
        end: u32,
    },
    /// The first differing byte
    Mismatch {
        /// Absolute address of the byte
        address: u32,
        /// Value the host expected
        expected: u8,
        /// Value read back from flash
        found: u8,
    },
}

impl VerifyOutcome {
    /// Returns true if all bytes matched
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Runtime state for one controlling host
pub struct FlashSession<B: QspiBus, O: OperationObserver = NoObserver> {
    bus: B,
    observer: O,
    config: SessionConfig,
    base: u32,
    clock_hz: u32,
    function: Option<Function>,
    mode: BusMode,
}

impl<B: QspiBus> FlashSession<B, NoObserver> {
    /// Create a session without an observer
    pub fn new(bus: B, config: SessionConfig) -> Result<Self> {
        Self::with_observer(bus, config, NoObserver)
    }
}

impl<B: QspiBus, O: OperationObserver> FlashSession<B, O> {
    /// Create a session that reports operation start/end to `observer`
    pub fn with_observer(bus: B, config: SessionConfig, observer: O) -> Result<Self> {
        config.geometry.validate()?;
        Ok(Self {
            bus,
            observer,
            config,
            base: 0,
            clock_hz: 0,
            function: None,
            mode: BusMode::Uninitialized,
        })
    }

    /// Current bus mode
    pub fn mode(&self) -> BusMode {
        self.mode
    }

    /// Base address configured at Init
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Function code of the active phase, if any
    pub fn function(&self) -> Option<Function> {
        self.function
    }

    /// Device geometry
    pub fn geometry(&self) -> &FlashGeometry {
        &self.config.geometry
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Borrow the bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the bus
    ///
    /// Transactions issued directly are not tracked in [`mode`](Self::mode).
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Mutably borrow the observer
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Tear the session down and hand the bus back
    pub fn into_bus(self) -> B {
        self.bus
    }

    // =========================================================================
    // Init / UnInit
    // =========================================================================

    /// Start a phase: bring up the transport and reset the device
    ///
    /// Session state is cleared first, so a session left in any state by an
    /// earlier failure starts over from scratch.
    pub fn init(&mut self, base: u32, clock_hz: u32, function: Function) -> Result<()> {
        self.function = None;
        self.mode = BusMode::Uninitialized;
        self.base = base;
        self.clock_hz = clock_hz;

        self.observed(Operation::Init, base, 0, |s| s.reinitialize())?;

        info!(
            "flash session up: base=0x{:08X} clock={} Hz function={:?}",
            base, clock_hz, function
        );
        self.function = Some(function);
        Ok(())
    }

    /// End a phase and leave the flash mapped for the target
    pub fn uninit(&mut self, function: Function) -> Result<()> {
        self.ensure_active()?;
        if self.function != Some(function) {
            warn!(
                "UnInit for {:?} while {:?} is active",
                function, self.function
            );
        }

        self.observed(Operation::UnInit, self.base, 0, |s| s.enter_memory_mapped())?;
        self.function = None;
        Ok(())
    }

    /// Bring up the transport, reset the device and wait until it is ready
    ///
    /// Leaves the session in command mode.
    pub fn reinitialize(&mut self) -> Result<()> {
        self.mode = BusMode::Uninitialized;
        self.bus.init(self.clock_hz)?;
        self.reset_device()?;
        self.bus.delay_ms(self.config.reset_settle_ms);
        let timeouts = &self.config.timeouts;
        protocol::wait_ready(
            &mut self.bus,
            timeouts.poll_interval_us,
            Some(timeouts.command_us),
        )?;
        self.mode = BusMode::Command;
        Ok(())
    }

    /// Issue Enable Reset + Reset Device and wait for the device
    pub fn reset_device(&mut self) -> Result<()> {
        debug!("software reset");
        protocol::software_reset(&mut self.bus, &self.config.timeouts)
    }

    // =========================================================================
    // Erase
    // =========================================================================

    /// Erase the whole device
    pub fn erase_chip(&mut self) -> Result<()> {
        let len = self.config.geometry.capacity;
        self.observed(Operation::EraseChip, self.base, len, |s| {
            s.ensure_active()?;
            s.enter_command_mode()?;
            info!("erasing entire chip ({} bytes)", len);
            s.mutate(protocol::chip_erase)
        })
    }

    /// Erase the sector containing `address`
    pub fn erase_sector(&mut self, address: u32) -> Result<()> {
        let sector = self.config.geometry.sector_size;
        self.observed(Operation::EraseSector, address, sector, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, 1)?;
            let start = s.config.geometry.sector_align_down(rel);
            s.enter_command_mode()?;
            s.erase_sectors(start, start + sector)
        })
    }

    /// Erase every sector overlapping `[address, address + len)`
    ///
    /// The start is aligned down to its sector; the sector holding the last
    /// byte is the last one erased. An empty range erases nothing.
    pub fn erase_range(&mut self, address: u32, len: u32) -> Result<()> {
        self.observed(Operation::EraseSector, address, len, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, len)?;
            if len == 0 {
                return Ok(());
            }
            let start = s.config.geometry.sector_align_down(rel);
            s.enter_command_mode()?;
            s.erase_sectors(start, rel + len)
        })
    }

    /// Erase the 64KB block containing `address`
    pub fn erase_block(&mut self, address: u32) -> Result<()> {
        let block = self.config.geometry.block_size;
        self.observed(Operation::EraseBlock, address, block, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, 1)?;
            let start = s.config.geometry.block_align_down(rel);
            s.enter_command_mode()?;
            s.mutate(|bus, t| protocol::erase_block(bus, start, t))
        })
    }

    /// Erase sectors from an aligned `start` while below `end`
    fn erase_sectors(&mut self, start: u32, end: u32) -> Result<()> {
        let sector = self.config.geometry.sector_size;
        let mut addr = start;
        while addr < end {
            self.mutate(|bus, t| protocol::erase_sector(bus, addr, t))?;
            addr += sector;
        }
        Ok(())
    }

    // =========================================================================
    // Program
    // =========================================================================

    /// Program `data` at `address`, split so no command crosses a page
    pub fn program(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let len = checked_len(address, data.len())?;
        self.observed(Operation::Program, address, len, |s| {
            s.ensure_active()?;
            let start = s.to_relative(address, len)?;
            s.enter_command_mode()?;

            let page_size = s.config.geometry.page_size;
            let end = start + len;
            let mut current = start;
            let mut offset = 0usize;
            let mut chunk = s.config.geometry.bytes_to_page_end(start).min(len);

            while chunk > 0 {
                let bytes = &data[offset..offset + chunk as usize];
                s.mutate(|bus, t| protocol::program_page(bus, current, bytes, t))?;
                current += chunk;
                offset += chunk as usize;
                chunk = page_size.min(end - current);
            }
            Ok(())
        })
    }

    // =========================================================================
    // Memory-mapped mode, verify, blank check
    // =========================================================================

    /// Switch to continuous fast-read mode
    ///
    /// Calling this while already mapped does nothing.
    pub fn enter_memory_mapped(&mut self) -> Result<()> {
        match self.mode {
            BusMode::MemoryMapped => return Ok(()),
            BusMode::Uninitialized => return Err(Error::NotInitialized),
            BusMode::Busy => self.enter_command_mode()?,
            BusMode::Command => {}
        }
        protocol::enable_memory_mapped(&mut self.bus)?;
        debug!("memory-mapped mode enabled");
        self.mode = BusMode::MemoryMapped;
        Ok(())
    }

    /// Compare flash contents at `address` against `expected`
    pub fn verify(&mut self, address: u32, expected: &[u8]) -> Result<VerifyOutcome> {
        let len = checked_len(address, expected.len())?;
        self.observed(Operation::Verify, address, len, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, len)?;
            s.enter_memory_mapped()?;

            for (i, &want) in expected.iter().enumerate() {
                let found = s.bus.read_mapped(rel + i as u32)?;
                if found != want {
                    let at = address + i as u32;
                    debug!(
                        "verify mismatch at 0x{:08X}: expected 0x{:02X}, found 0x{:02X}",
                        at, want, found
                    );
                    return Ok(VerifyOutcome::Mismatch {
                        address: at,
                        expected: want,
                        found,
                    });
                }
            }
            Ok(VerifyOutcome::Match { end: address + len })
        })
    }

    /// Check that `[address, address + size)` holds only `pattern`
    ///
    /// Returns `Ok(false)` when a byte differs. Afterwards the device is
    /// re-initialized back into command mode whatever the outcome; a failed
    /// re-init is retried once after a delay.
    pub fn blank_check(&mut self, address: u32, size: u32, pattern: u8) -> Result<bool> {
        self.observed(Operation::BlankCheck, address, size, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, size)?;

            let outcome = s
                .enter_memory_mapped()
                .and_then(|_| s.scan_pattern(rel, size, pattern));
            s.reinitialize_with_retry()?;
            outcome
        })
    }

    fn scan_pattern(&mut self, rel: u32, size: u32, pattern: u8) -> Result<bool> {
        for offset in rel..rel + size {
            let found = self.bus.read_mapped(offset)?;
            if found != pattern {
                debug!(
                    "blank check: 0x{:02X} at offset 0x{:06X}, expected 0x{:02X}",
                    found, offset, pattern
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn reinitialize_with_retry(&mut self) -> Result<()> {
        if let Err(e) = self.reinitialize() {
            let delay = self.config.reinit_retry_delay_ms;
            warn!("re-init failed ({}), retrying in {} ms", e, delay);
            self.bus.delay_ms(delay);
            self.reinitialize()?;
        }
        Ok(())
    }

    /// Copy flash contents at `address` into `buf` through the mapped view
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let len = checked_len(address, buf.len())?;
        self.observed(Operation::Read, address, len, |s| {
            s.ensure_active()?;
            let rel = s.to_relative(address, len)?;
            s.enter_memory_mapped()?;
            s.bus.read_mapped_into(rel, buf)
        })
    }

    // =========================================================================
    // Identification
    // =========================================================================

    /// Read the manufacturer and device ID
    pub fn read_device_id(&mut self) -> Result<(u8, u8)> {
        self.ensure_active()?;
        self.enter_command_mode()?;
        protocol::read_device_id(&mut self.bus)
    }

    /// Read the JEDEC manufacturer and device ID
    pub fn read_jedec_id(&mut self) -> Result<(u8, u16)> {
        self.ensure_active()?;
        self.enter_command_mode()?;
        protocol::read_jedec_id(&mut self.bus)
    }

    /// Read the 64-bit factory unique ID
    pub fn read_unique_id(&mut self) -> Result<[u8; 8]> {
        self.ensure_active()?;
        self.enter_command_mode()?;
        protocol::read_unique_id(&mut self.bus)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_active(&self) -> Result<()> {
        if self.function.is_none() || self.mode == BusMode::Uninitialized {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    /// Convert a host address to a device-relative one, checking the range
    fn to_relative(&self, address: u32, len: u32) -> Result<u32> {
        let out_of_range = Error::AddressOutOfRange { addr: address };
        if address < self.base || address.checked_add(len).is_none() {
            return Err(out_of_range);
        }
        let rel = address - self.base;
        if !self.config.geometry.contains(rel, len) {
            return Err(out_of_range);
        }
        Ok(rel)
    }

    /// Leave mapped mode, or wait out a busy device, before a command
    fn enter_command_mode(&mut self) -> Result<()> {
        match self.mode {
            BusMode::Command => Ok(()),
            BusMode::Uninitialized => Err(Error::NotInitialized),
            BusMode::MemoryMapped => {
                self.bus.abort().map_err(|_| Error::ModeTransitionFailure {
                    target: BusMode::Command,
                })?;
                debug!("left memory-mapped mode");
                self.mode = BusMode::Command;
                Ok(())
            }
            BusMode::Busy => {
                warn!("device left busy by an earlier failure, waiting for it");
                let timeouts = &self.config.timeouts;
                protocol::wait_ready(
                    &mut self.bus,
                    timeouts.erase_poll_interval_us,
                    Some(timeouts.block_erase_us),
                )?;
                self.mode = BusMode::Command;
                Ok(())
            }
        }
    }

    /// Run one program/erase sequence, tracking the busy state
    ///
    /// On error the session stays `Busy`.
    fn mutate<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut B, &super::Timeouts) -> Result<()>,
    {
        self.mode = BusMode::Busy;
        op(&mut self.bus, &self.config.timeouts)?;
        self.mode = BusMode::Command;
        Ok(())
    }

    fn observed<T, F>(&mut self, op: Operation, addr: u32, len: u32, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.observer.started(op, addr, len);
        let result = f(self);
        if let Err(e) = &result {
            debug!("{:?} at 0x{:08X} failed: {}", op, addr, e);
        }
        self.observer.finished(op, result.is_ok());
        result
    }
}

/// Buffer length as a u32, rejecting buffers no device could hold
fn checked_len(address: u32, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::AddressOutOfRange { addr: address })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::mock::MockBus;
    use crate::qspi::opcodes;
    use std::vec;
    use std::vec::Vec;

    const BASE: u32 = 0x9000_0000;
    const CAPACITY: u32 = 0x2_0000;

    fn test_config() -> SessionConfig {
        SessionConfig {
            geometry: FlashGeometry {
                capacity: CAPACITY,
                ..FlashGeometry::W25Q64JV
            },
            ..SessionConfig::default()
        }
    }

    fn session() -> FlashSession<MockBus> {
        let mut s = FlashSession::new(MockBus::new(CAPACITY as usize), test_config()).unwrap();
        s.init(BASE, 100_000_000, Function::Program).unwrap();
        s.bus_mut().transactions.clear();
        s
    }

    /// Check that every erase/program is WREN, WEL poll, command, ready poll(s)
    fn assert_framed(instructions: &[u8], command: u8) {
        for (i, &ins) in instructions.iter().enumerate() {
            if ins == command {
                assert!(i >= 2, "command at {} has no write enable", i);
                assert_eq!(instructions[i - 2], opcodes::WREN);
                assert_eq!(instructions[i - 1], opcodes::RDSR);
                assert_eq!(instructions.get(i + 1), Some(&opcodes::RDSR));
            }
        }
    }

    #[test]
    fn test_init_resets_device_and_enters_command_mode() {
        let mut s = FlashSession::new(MockBus::new(CAPACITY as usize), test_config()).unwrap();
        assert_eq!(s.mode(), BusMode::Uninitialized);
        s.init(BASE, 1, Function::Erase).unwrap();
        assert_eq!(s.mode(), BusMode::Command);
        assert_eq!(s.function(), Some(Function::Erase));
        assert_eq!(s.bus().inits, 1);
        assert_eq!(
            &s.bus().instructions()[..3],
            &[opcodes::RSTEN, opcodes::RST, opcodes::RDSR]
        );
    }

    #[test]
    fn test_init_fails_when_bus_does_not_come_up() {
        let mut bus = MockBus::new(CAPACITY as usize);
        bus.fail_inits = 1;
        let mut s = FlashSession::new(bus, test_config()).unwrap();
        assert!(s.init(BASE, 1, Function::Erase).is_err());
        assert_eq!(s.mode(), BusMode::Uninitialized);
        assert_eq!(s.erase_sector(BASE), Err(Error::NotInitialized));
    }

    #[test]
    fn test_rejects_invalid_geometry() {
        let config = SessionConfig {
            geometry: FlashGeometry {
                page_size: 100,
                ..FlashGeometry::W25Q64JV
            },
            ..SessionConfig::default()
        };
        assert!(matches!(
            FlashSession::new(MockBus::new(16), config),
            Err(Error::InvalidGeometry)
        ));
    }

    #[test]
    fn test_operations_before_init() {
        let mut s = FlashSession::new(MockBus::new(CAPACITY as usize), test_config()).unwrap();
        assert_eq!(s.program(BASE, &[0]), Err(Error::NotInitialized));
        assert_eq!(s.erase_chip(), Err(Error::NotInitialized));
        assert_eq!(s.enter_memory_mapped(), Err(Error::NotInitialized));
        assert!(s.bus().transactions.is_empty());
    }

    #[test]
    fn test_address_below_base_issues_nothing() {
        let mut s = session();
        let below = BASE - 1;
        let oor = Err(Error::AddressOutOfRange { addr: below });
        assert_eq!(s.erase_sector(below), oor);
        assert_eq!(s.erase_range(below, 0x1000), oor);
        assert_eq!(s.erase_block(below), oor);
        assert_eq!(s.program(below, &[0; 4]), oor);
        assert_eq!(
            s.verify(below, &[0; 4]),
            Err(Error::AddressOutOfRange { addr: below })
        );
        assert_eq!(
            s.blank_check(below, 4, 0xFF),
            Err(Error::AddressOutOfRange { addr: below })
        );
        assert_eq!(
            s.program(0, &[0; 4]),
            Err(Error::AddressOutOfRange { addr: 0 })
        );
        assert!(s.bus().transactions.is_empty());
    }

    #[test]
    fn test_address_past_end_issues_nothing() {
        let mut s = session();
        let last = BASE + CAPACITY - 2;
        assert_eq!(
            s.program(last, &[0; 4]),
            Err(Error::AddressOutOfRange { addr: last })
        );
        assert_eq!(
            s.erase_sector(BASE + CAPACITY),
            Err(Error::AddressOutOfRange {
                addr: BASE + CAPACITY,
            })
        );
        assert!(s.bus().transactions.is_empty());
    }

    #[test]
    fn test_erase_sector_aligns_down() {
        let mut s = session();
        s.bus_mut().memory[0x0FFF] = 0x00;
        s.bus_mut().memory[0x1000] = 0x00;
        s.bus_mut().memory[0x1FFF] = 0x00;
        s.bus_mut().memory[0x2000] = 0x00;

        s.erase_sector(BASE + 0x1050).unwrap();

        let erases = s.bus().with_instruction(opcodes::SE_20);
        assert_eq!(erases, vec![(opcodes::SE_20, Some(0x1000), 0)]);
        assert_framed(&s.bus().instructions(), opcodes::SE_20);
        assert_eq!(s.bus().memory[0x0FFF], 0x00);
        assert_eq!(s.bus().memory[0x1000], 0xFF);
        assert_eq!(s.bus().memory[0x1FFF], 0xFF);
        assert_eq!(s.bus().memory[0x2000], 0x00);
        assert_eq!(s.mode(), BusMode::Command);
    }

    #[test]
    fn test_erase_range_issues_one_command_per_sector() {
        for sectors in 1..=5u32 {
            let mut s = session();
            s.erase_range(BASE + 0x3000, sectors * 0x1000).unwrap();
            let erases = s.bus().with_instruction(opcodes::SE_20);
            assert_eq!(erases.len(), sectors as usize);
            for (i, erase) in erases.iter().enumerate() {
                assert_eq!(erase.1, Some(0x3000 + i as u32 * 0x1000));
            }
            let instructions = s.bus().instructions();
            assert_eq!(
                instructions.iter().filter(|&&i| i == opcodes::WREN).count(),
                sectors as usize
            );
            assert_framed(&instructions, opcodes::SE_20);
        }
    }

    #[test]
    fn test_erase_range_unaligned_covers_partial_sectors() {
        let mut s = session();
        s.erase_range(BASE + 0x1800, 0x1000).unwrap();
        let addrs: Vec<_> = s
            .bus()
            .with_instruction(opcodes::SE_20)
            .iter()
            .map(|t| t.1)
            .collect();
        assert_eq!(addrs, vec![Some(0x1000), Some(0x2000)]);
    }

    #[test]
    fn test_erase_range_empty() {
        let mut s = session();
        s.erase_range(BASE + 0x1000, 0).unwrap();
        assert!(s.bus().transactions.is_empty());
    }

    #[test]
    fn test_erase_block() {
        let mut s = session();
        s.bus_mut().memory[0x1_0000] = 0;
        s.bus_mut().memory[0x1_FFFF] = 0;
        s.erase_block(BASE + 0x1_2345).unwrap();
        assert_eq!(
            s.bus().with_instruction(opcodes::BE_D8),
            vec![(opcodes::BE_D8, Some(0x1_0000), 0)]
        );
        assert_framed(&s.bus().instructions(), opcodes::BE_D8);
        assert_eq!(s.bus().memory[0x1_0000], 0xFF);
        assert_eq!(s.bus().memory[0x1_FFFF], 0xFF);
    }

    #[test]
    fn test_erase_chip() {
        let mut s = session();
        s.bus_mut().memory.fill(0x5A);
        s.bus_mut().busy_polls = 50;
        s.erase_chip().unwrap();
        assert!(s.bus().memory.iter().all(|&b| b == 0xFF));
        assert_framed(&s.bus().instructions(), opcodes::CE_C7);
    }

    #[test]
    fn test_program_splits_at_page_boundary() {
        let mut s = session();
        let data: Vec<u8> = (0..300).map(|i| i as u8).collect();
        s.program(BASE, &data).unwrap();

        let programs = s.bus().with_instruction(opcodes::PP);
        assert_eq!(
            programs,
            vec![(opcodes::PP, Some(0), 256), (opcodes::PP, Some(256), 44)]
        );
        assert_framed(&s.bus().instructions(), opcodes::PP);
        assert_eq!(&s.bus().memory[..300], &data[..]);
    }

    #[test]
    fn test_program_never_crosses_a_page() {
        let cases: [(u32, usize); 6] = [
            (0x00, 1),
            (0x10, 0xF0),
            (0x10, 0xF1),
            (0xFF, 2),
            (0x1234, 1000),
            (0x7F0, 0x900),
        ];
        for (offset, len) in cases {
            let mut s = session();
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            s.program(BASE + offset, &data).unwrap();

            let programs = s.bus().with_instruction(opcodes::PP);
            let mut expected_next = offset;
            for (_, addr, n) in &programs {
                let addr = addr.unwrap();
                assert_eq!(addr, expected_next);
                assert!(*n > 0 && *n <= 256);
                assert_eq!(addr / 256, (addr + *n as u32 - 1) / 256);
                expected_next = addr + *n as u32;
            }
            assert_eq!(expected_next, offset + len as u32);
            let start = offset as usize;
            assert_eq!(&s.bus().memory[start..start + len], &data[..]);
        }
    }

    #[test]
    fn test_program_zero_length_issues_nothing() {
        let mut s = session();
        s.program(BASE + 0x80, &[]).unwrap();
        assert!(s.bus().transactions.is_empty());
    }

    #[test]
    fn test_program_timeout_leaves_session_busy() {
        let mut s = session();
        s.bus_mut().stuck_busy = true;
        assert_eq!(s.program(BASE, &[0x00; 4]), Err(Error::Timeout));
        assert_eq!(s.mode(), BusMode::Busy);

        // A later command waits for the device first
        s.bus_mut().stuck_busy = false;
        s.program(BASE + 0x100, &[0x00; 4]).unwrap();
        assert_eq!(s.mode(), BusMode::Command);
    }

    #[test]
    fn test_program_then_verify() {
        let mut s = session();
        let data: Vec<u8> = (0..1000).map(|i| (i * 13 + 5) as u8).collect();
        s.program(BASE + 0x2F0, &data).unwrap();
        assert_eq!(
            s.verify(BASE + 0x2F0, &data).unwrap(),
            VerifyOutcome::Match {
                end: BASE + 0x2F0 + 1000
            }
        );
        assert_eq!(s.mode(), BusMode::MemoryMapped);
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let mut s = session();
        s.program(BASE, &[1, 2, 3, 4]).unwrap();
        let outcome = s.verify(BASE, &[1, 2, 9, 4]).unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Mismatch {
                address: BASE + 2,
                expected: 9,
                found: 3
            }
        );
        assert!(!outcome.is_match());
    }

    #[test]
    fn test_verify_at_zero_is_not_ambiguous() {
        let mut s = FlashSession::new(MockBus::new(CAPACITY as usize), test_config()).unwrap();
        s.init(0, 1, Function::Verify).unwrap();
        assert_eq!(s.verify(0, &[]).unwrap(), VerifyOutcome::Match { end: 0 });

        s.init(0, 1, Function::Verify).unwrap();
        s.bus_mut().fail_mapping = true;
        assert_eq!(
            s.verify(0, &[]),
            Err(Error::ModeTransitionFailure {
                target: BusMode::MemoryMapped
            })
        );
    }

    #[test]
    fn test_enter_memory_mapped_is_idempotent() {
        let mut s = session();
        s.enter_memory_mapped().unwrap();
        s.enter_memory_mapped().unwrap();
        assert_eq!(s.mode(), BusMode::MemoryMapped);
        assert_eq!(s.bus().mapped_entries, 1);
        assert!(s.bus().mapped);
    }

    #[test]
    fn test_command_after_mapped_leaves_mapped_mode() {
        let mut s = session();
        s.enter_memory_mapped().unwrap();
        s.erase_sector(BASE).unwrap();
        assert_eq!(s.mode(), BusMode::Command);
        assert!(!s.bus().mapped);

        // Mapping is re-entered for the next read
        let mut buf = [0u8; 4];
        s.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
        assert_eq!(s.bus().mapped_entries, 2);
    }

    #[test]
    fn test_blank_check() {
        let mut s = session();
        assert!(s.blank_check(BASE, 0x1000, 0xFF).unwrap());
        assert_eq!(s.mode(), BusMode::Command);

        s.bus_mut().memory[0x0ABC] = 0x00;
        assert!(!s.blank_check(BASE, 0x1000, 0xFF).unwrap());
        assert!(s.blank_check(BASE + 0x1000, 0x1000, 0xFF).unwrap());
        assert_eq!(s.mode(), BusMode::Command);
    }

    #[test]
    fn test_blank_check_reinitializes() {
        let mut s = session();
        let inits = s.bus().inits;
        s.blank_check(BASE, 16, 0xFF).unwrap();
        assert_eq!(s.bus().inits, inits + 1);
        assert!(!s.bus().mapped);
    }

    #[test]
    fn test_blank_check_retries_reinit_once() {
        let mut s = session();
        let inits = s.bus().inits;
        s.bus_mut().fail_inits = 1;
        assert!(s.blank_check(BASE, 16, 0xFF).unwrap());
        assert_eq!(s.bus().inits, inits + 2);

        s.bus_mut().fail_inits = 2;
        assert!(s.blank_check(BASE, 16, 0xFF).is_err());
    }

    #[test]
    fn test_blank_check_mapping_failure_still_reinitializes() {
        let mut s = session();
        let inits = s.bus().inits;
        s.bus_mut().fail_mapping = true;
        assert_eq!(
            s.blank_check(BASE, 16, 0xFF),
            Err(Error::ModeTransitionFailure {
                target: BusMode::MemoryMapped
            })
        );
        assert_eq!(s.bus().inits, inits + 1);
        assert_eq!(s.mode(), BusMode::Command);
    }

    #[test]
    fn test_uninit_leaves_flash_mapped() {
        let mut s = session();
        s.uninit(Function::Program).unwrap();
        assert_eq!(s.mode(), BusMode::MemoryMapped);
        assert_eq!(s.function(), None);
        assert_eq!(s.erase_sector(BASE), Err(Error::NotInitialized));
        assert_eq!(s.uninit(Function::Program), Err(Error::NotInitialized));
    }

    #[test]
    fn test_identification() {
        let mut s = session();
        assert_eq!(s.read_device_id().unwrap(), (0xEF, 0x16));
        assert_eq!(s.read_jedec_id().unwrap(), (0xEF, 0x4017));
        assert_eq!(s.read_unique_id().unwrap(), [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_observer_sees_start_and_end() {
        #[derive(Default)]
        struct Recorder(Vec<(Operation, Option<bool>)>);
        impl OperationObserver for Recorder {
            fn started(&mut self, op: Operation, _addr: u32, _len: u32) {
                self.0.push((op, None));
            }
            fn finished(&mut self, op: Operation, ok: bool) {
                self.0.push((op, Some(ok)));
            }
        }

        let bus = MockBus::new(CAPACITY as usize);
        let mut s = FlashSession::with_observer(bus, test_config(), Recorder::default()).unwrap();
        s.init(BASE, 1, Function::Erase).unwrap();
        s.erase_sector(BASE).unwrap();
        assert!(s.erase_sector(0).is_err());
        assert_eq!(
            s.observer_mut().0,
            vec![
                (Operation::Init, None),
                (Operation::Init, Some(true)),
                (Operation::EraseSector, None),
                (Operation::EraseSector, Some(true)),
                (Operation::EraseSector, None),
                (Operation::EraseSector, Some(false)),
            ]
        );
    }
}
