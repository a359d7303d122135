//! qflash-emu - In-memory W25Q64JV behind an emulated quad-SPI controller
//!
//! This crate provides a [`QspiBus`] implementation that emulates both the
//! controller and the flash part in memory. It behaves like the real device
//! where the programming algorithm can observe it: the write enable latch,
//! busy time after program/erase, page wrap-around, the reset handshake and
//! memory-mapped reads. Faults can be injected to exercise error paths.

mod image;

pub use image::EmuError;

use std::fmt;

use log::{debug, trace, warn};

use qflash_core::bus::{BusCapabilities, QspiBus};
use qflash_core::error::{BusFailure, Error, Result};
use qflash_core::flash::FlashGeometry;
use qflash_core::qspi::{opcodes, IoMode, QspiCommand};

/// Configuration for the emulated flash
#[derive(Debug, Clone)]
pub struct EmuConfig {
    /// Manufacturer ID (Read Manufacturer/Device ID and JEDEC ID)
    pub manufacturer_id: u8,
    /// Device ID reported by Read Manufacturer/Device ID
    pub device_id: u8,
    /// Memory type and capacity reported by JEDEC ID
    pub jedec_device_id: u16,
    /// Factory unique ID
    pub unique_id: [u8; 8],
    /// Device geometry
    pub geometry: FlashGeometry,
    /// Features advertised by the emulated controller
    pub capabilities: BusCapabilities,
    /// Status reads a page program stays busy for
    pub program_busy_polls: u32,
    /// Status reads a sector or block erase stays busy for
    pub erase_busy_polls: u32,
    /// Status reads a chip erase stays busy for
    pub chip_erase_busy_polls: u32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0xEF, // Winbond
            device_id: 0x16,
            jedec_device_id: 0x4017, // W25Q64JV-IQ
            unique_id: [0xD2, 0x65, 0x38, 0x22, 0x83, 0x1A, 0x4F, 0x2C],
            geometry: FlashGeometry::W25Q64JV,
            capabilities: BusCapabilities::QUAD | BusCapabilities::MEMORY_MAPPED,
            program_busy_polls: 2,
            erase_busy_polls: 8,
            chip_erase_busy_polls: 32,
        }
    }
}

/// Faults the emulator can be told to produce
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Number of upcoming `init` calls that fail
    pub fail_inits: u32,
    /// Transactions with this instruction fail on the bus
    pub fail_instruction: Option<u8>,
    /// The device never leaves busy once a program/erase starts
    pub stuck_busy: bool,
    /// Memory-mapped mode cannot be entered
    pub fail_mapping: bool,
}

/// One transaction as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Instruction, address and alternate bytes
    pub header: Vec<u8>,
    /// Line widths used
    pub io_mode: IoMode,
    /// Number of data bytes written or read
    pub payload_len: usize,
    /// The transaction entered memory-mapped mode
    pub mapped: bool,
}

impl Transaction {
    /// Instruction byte
    pub fn instruction(&self) -> u8 {
        self.header[0]
    }

    /// 24-bit address, if the header carries one
    pub fn address(&self) -> Option<u32> {
        match self.header[..] {
            [_, a, b, c, ..] => Some(u32::from_be_bytes([0, a, b, c])),
            _ => None,
        }
    }
}

/// Emulated quad-SPI controller with a W25Q64JV attached
pub struct EmulatedW25q {
    config: EmuConfig,
    data: Vec<u8>,
    faults: Faults,
    clock_hz: u32,
    write_enabled: bool,
    busy_left: u32,
    stuck: bool,
    reset_enabled: bool,
    mapped: bool,
    elapsed_us: u64,
    log: Vec<Transaction>,
}

// Contents are left out; an 8 MiB dump helps nobody
impl fmt::Debug for EmulatedW25q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedW25q")
            .field("capacity", &self.data.len())
            .field("clock_hz", &self.clock_hz)
            .field("write_enabled", &self.write_enabled)
            .field("busy", &(self.busy_left > 0 || self.stuck))
            .field("mapped", &self.mapped)
            .field("transactions", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl EmulatedW25q {
    /// Create an erased device with the given configuration
    pub fn new(config: EmuConfig) -> Self {
        let data = vec![0xFF; config.geometry.capacity as usize];
        Self {
            config,
            data,
            faults: Faults::default(),
            clock_hz: 0,
            write_enabled: false,
            busy_left: 0,
            stuck: false,
            reset_enabled: false,
            mapped: false,
            elapsed_us: 0,
            log: Vec::new(),
        }
    }

    /// Create an erased W25Q64JV
    pub fn new_default() -> Self {
        Self::new(EmuConfig::default())
    }

    /// Create a device whose contents start with `initial_data`
    pub fn with_data(config: EmuConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = initial_data.len().min(flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable flash contents, bypassing the device
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Emulator configuration
    pub fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// Fault injection settings
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Transactions issued since creation or the last clear
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Forget recorded transactions
    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    /// Whether memory-mapped mode is active
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Clock the controller was last initialized with
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Total time spent in `delay_us`
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    fn record(&mut self, cmd: &QspiCommand<'_>, mapped: bool) {
        let mut header = vec![0u8; cmd.header_len()];
        let len = cmd.encode_header(&mut header);
        header.truncate(len);
        trace!(
            "0x{:02X} 1-{}-{} payload {}",
            cmd.instruction,
            cmd.io_mode.address_lines(),
            cmd.io_mode.data_lines(),
            cmd.payload_len()
        );
        self.log.push(Transaction {
            header,
            io_mode: cmd.io_mode,
            payload_len: cmd.payload_len(),
            mapped,
        });
    }

    /// Device-relative address with the part's address wrap applied
    fn device_address(&self, cmd: &QspiCommand<'_>) -> usize {
        let addr = cmd.address.unwrap_or(0) & (self.config.geometry.capacity - 1);
        addr as usize
    }

    fn start_busy(&mut self, polls: u32) {
        self.write_enabled = false;
        self.busy_left = polls;
        self.stuck = self.faults.stuck_busy;
    }

    fn handle_status(&mut self, cmd: &mut QspiCommand<'_>) {
        let busy = self.busy_left > 0 || self.stuck;
        self.busy_left = self.busy_left.saturating_sub(1);

        let mut status = 0;
        if busy {
            status |= opcodes::SR1_WIP;
        }
        if self.write_enabled {
            status |= opcodes::SR1_WEL;
        }
        trace!("status read: 0x{:02X}", status);
        if let Some(byte) = cmd.read_buf.first_mut() {
            *byte = status;
        }
    }

    fn handle_page_program(&mut self, cmd: &QspiCommand<'_>) {
        if !self.write_enabled {
            warn!("page program without write enable ignored");
            return;
        }

        // The address counter wraps inside the page, as on the real part
        let page_size = self.config.geometry.page_size as usize;
        let addr = self.device_address(cmd);
        let page_start = addr - addr % page_size;
        for (i, &byte) in cmd.write_data.iter().enumerate() {
            let at = page_start + (addr - page_start + i) % page_size;
            self.data[at] &= byte;
        }
        if cmd.write_data.len() > page_size {
            warn!(
                "page program of {} bytes wrapped inside page 0x{:06X}",
                cmd.write_data.len(),
                page_start
            );
        }
        self.start_busy(self.config.program_busy_polls);
    }

    fn handle_erase(&mut self, cmd: &QspiCommand<'_>, size: u32) {
        if !self.write_enabled {
            warn!(
                "erase 0x{:02X} without write enable ignored",
                cmd.instruction
            );
            return;
        }

        let size = size as usize;
        let start = self.device_address(cmd) & !(size - 1);
        self.data[start..start + size].fill(0xFF);
        self.start_busy(self.config.erase_busy_polls);
    }

    fn handle_chip_erase(&mut self) {
        if !self.write_enabled {
            warn!("chip erase without write enable ignored");
            return;
        }
        self.data.fill(0xFF);
        self.start_busy(self.config.chip_erase_busy_polls);
    }

    /// Reset Device, honoured only straight after Enable Reset
    ///
    /// A reset also terminates a running program or erase.
    fn handle_reset(&mut self, armed: bool) {
        if !armed {
            warn!("reset without enable reset ignored");
            return;
        }
        debug!("device reset");
        self.write_enabled = false;
        self.busy_left = 0;
        self.stuck = false;
    }
}

impl QspiBus for EmulatedW25q {
    fn capabilities(&self) -> BusCapabilities {
        self.config.capabilities
    }

    fn init(&mut self, clock_hz: u32) -> Result<()> {
        self.mapped = false;
        if self.faults.fail_inits > 0 {
            self.faults.fail_inits -= 1;
            return Err(Error::BusError(BusFailure::InitFailed));
        }
        if clock_hz == 0 {
            warn!("controller init with a zero clock");
            return Err(Error::BusError(BusFailure::InitFailed));
        }
        debug!("controller up at {} Hz", clock_hz);
        self.clock_hz = clock_hz;
        Ok(())
    }

    fn execute(&mut self, cmd: &mut QspiCommand<'_>) -> Result<()> {
        self.record(cmd, false);

        if self.mapped {
            warn!(
                "instruction 0x{:02X} issued while memory-mapped",
                cmd.instruction
            );
            return Err(Error::BusError(BusFailure::TransferFailed {
                instruction: cmd.instruction,
            }));
        }
        if self.faults.fail_instruction == Some(cmd.instruction) {
            return Err(Error::BusError(BusFailure::TransferFailed {
                instruction: cmd.instruction,
            }));
        }

        let reset_armed = core::mem::take(&mut self.reset_enabled);
        let busy = self.busy_left > 0 || self.stuck;
        let accepted_while_busy = matches!(
            cmd.instruction,
            opcodes::RDSR | opcodes::RSTEN | opcodes::RST
        );
        if busy && !accepted_while_busy {
            warn!("instruction 0x{:02X} ignored while busy", cmd.instruction);
            return Ok(());
        }

        match cmd.instruction {
            opcodes::WREN => self.write_enabled = true,
            opcodes::RDSR => self.handle_status(cmd),
            opcodes::PP => self.handle_page_program(cmd),
            opcodes::SE_20 => self.handle_erase(cmd, self.config.geometry.sector_size),
            opcodes::BE_D8 => self.handle_erase(cmd, self.config.geometry.block_size),
            opcodes::CE_C7 => self.handle_chip_erase(),
            opcodes::RSTEN => self.reset_enabled = true,
            opcodes::RST => self.handle_reset(reset_armed),
            opcodes::REMS => {
                let id = [self.config.manufacturer_id, self.config.device_id];
                for (dst, src) in cmd.read_buf.iter_mut().zip(id.iter().cycle()) {
                    *dst = *src;
                }
            }
            opcodes::RDID => {
                let [hi, lo] = self.config.jedec_device_id.to_be_bytes();
                let id = [self.config.manufacturer_id, hi, lo];
                for (dst, src) in cmd.read_buf.iter_mut().zip(id.iter()) {
                    *dst = *src;
                }
            }
            opcodes::RDUID => {
                for (dst, src) in cmd.read_buf.iter_mut().zip(self.config.unique_id.iter()) {
                    *dst = *src;
                }
            }
            other => {
                return Err(Error::BusError(BusFailure::Unsupported {
                    instruction: other,
                }));
            }
        }
        Ok(())
    }

    fn enable_memory_mapped(&mut self, cmd: &QspiCommand<'_>) -> Result<()> {
        self.record(cmd, true);

        let failure = Error::BusError(BusFailure::TransferFailed {
            instruction: cmd.instruction,
        });
        let capable = self
            .config
            .capabilities
            .contains(BusCapabilities::MEMORY_MAPPED);
        if self.faults.fail_mapping || !capable {
            return Err(failure);
        }
        if cmd.instruction != opcodes::QIOR || cmd.io_mode != IoMode::QuadIo {
            warn!(
                "memory mapping only emulated for fast read quad I/O, got 0x{:02X}",
                cmd.instruction
            );
            return Err(Error::BusError(BusFailure::Unsupported {
                instruction: cmd.instruction,
            }));
        }
        if self.busy_left > 0 || self.stuck {
            return Err(failure);
        }
        self.mapped = true;
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.mapped = false;
        Ok(())
    }

    fn read_mapped(&mut self, offset: u32) -> Result<u8> {
        if !self.mapped {
            return Err(Error::BusError(BusFailure::TransferFailed {
                instruction: opcodes::QIOR,
            }));
        }
        self.data
            .get(offset as usize)
            .copied()
            .ok_or(Error::BusError(BusFailure::TransferFailed {
                instruction: opcodes::QIOR,
            }))
    }

    fn read_mapped_into(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let range = self.data.get(start..start + buf.len());
        match range {
            Some(src) if self.mapped => {
                buf.copy_from_slice(src);
                Ok(())
            }
            _ => Err(Error::BusError(BusFailure::TransferFailed {
                instruction: opcodes::QIOR,
            })),
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += u64::from(us);
    }
}
