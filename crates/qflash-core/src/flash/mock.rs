//! Recording bus used by the session and host-boundary tests

use std::vec;
use std::vec::Vec;

use crate::bus::{BusCapabilities, QspiBus};
use crate::error::{BusFailure, Error, Result};
use crate::qspi::{opcodes, QspiCommand};

/// One recorded transaction: (instruction, address, payload length)
pub(crate) type Transaction = (u8, Option<u32>, usize);

/// A mock QSPI bus that simulates a small flash
///
/// - Memory starts as all 0xFF
/// - WREN sets WEL, program/erase clear it
/// - Each program/erase keeps the device busy for `busy_polls` status reads
/// - Program only clears bits and wraps inside the page, like the part
pub(crate) struct MockBus {
    pub memory: Vec<u8>,
    pub page_size: usize,
    pub transactions: Vec<Transaction>,
    pub busy_polls: u32,
    busy_left: u32,
    wel: bool,
    pub mapped: bool,
    pub mapped_entries: u32,
    pub inits: u32,
    pub fail_inits: u32,
    pub fail_mapping: bool,
    pub stuck_busy: bool,
}

impl MockBus {
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0xFF; size],
            page_size: 256,
            transactions: Vec::new(),
            busy_polls: 1,
            busy_left: 0,
            wel: false,
            mapped: false,
            mapped_entries: 0,
            inits: 0,
            fail_inits: 0,
            fail_mapping: false,
            stuck_busy: false,
        }
    }

    /// Instructions in issue order
    pub fn instructions(&self) -> Vec<u8> {
        self.transactions.iter().map(|t| t.0).collect()
    }

    /// Recorded transactions with the given instruction
    pub fn with_instruction(&self, instruction: u8) -> Vec<Transaction> {
        self.transactions
            .iter()
            .copied()
            .filter(|t| t.0 == instruction)
            .collect()
    }

    fn start_busy(&mut self) {
        self.wel = false;
        self.busy_left = self.busy_polls;
    }
}

impl QspiBus for MockBus {
    fn capabilities(&self) -> BusCapabilities {
        BusCapabilities::QUAD | BusCapabilities::MEMORY_MAPPED
    }

    fn init(&mut self, _clock_hz: u32) -> Result<()> {
        self.inits += 1;
        self.mapped = false;
        if self.fail_inits > 0 {
            self.fail_inits -= 1;
            return Err(Error::BusError(BusFailure::InitFailed));
        }
        Ok(())
    }

    fn execute(&mut self, cmd: &mut QspiCommand<'_>) -> Result<()> {
        self.mapped = false;
        self.transactions
            .push((cmd.instruction, cmd.address, cmd.payload_len()));

        match cmd.instruction {
            opcodes::WREN => {
                if self.busy_left == 0 {
                    self.wel = true;
                }
            }
            opcodes::RDSR => {
                let busy = self.busy_left > 0 || self.stuck_busy;
                self.busy_left = self.busy_left.saturating_sub(1);
                let mut status = 0;
                if busy {
                    status |= opcodes::SR1_WIP;
                }
                if self.wel {
                    status |= opcodes::SR1_WEL;
                }
                cmd.read_buf[0] = status;
            }
            opcodes::PP => {
                if self.wel {
                    let addr = cmd.address.unwrap_or(0) as usize;
                    let page_start = addr - addr % self.page_size;
                    for (i, byte) in cmd.write_data.iter().enumerate() {
                        let at = page_start + (addr + i - page_start) % self.page_size;
                        self.memory[at] &= byte;
                    }
                }
                self.start_busy();
            }
            opcodes::SE_20 | opcodes::BE_D8 => {
                if self.wel {
                    let size = if cmd.instruction == opcodes::SE_20 {
                        0x1000
                    } else {
                        0x1_0000
                    };
                    let addr = cmd.address.unwrap_or(0) as usize & !(size - 1);
                    let end = (addr + size).min(self.memory.len());
                    self.memory[addr..end].fill(0xFF);
                }
                self.start_busy();
            }
            opcodes::CE_C7 => {
                if self.wel {
                    self.memory.fill(0xFF);
                }
                self.start_busy();
            }
            opcodes::RSTEN | opcodes::RST => {
                self.wel = false;
                self.busy_left = 0;
            }
            opcodes::REMS => {
                cmd.read_buf.copy_from_slice(&[0xEF, 0x16]);
            }
            opcodes::RDID => {
                cmd.read_buf.copy_from_slice(&[0xEF, 0x40, 0x17]);
            }
            opcodes::RDUID => {
                for (i, byte) in cmd.read_buf.iter_mut().enumerate() {
                    *byte = i as u8;
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
        self.transactions
            .push((cmd.instruction, cmd.address, cmd.payload_len()));
        if self.fail_mapping {
            return Err(Error::BusError(BusFailure::TransferFailed {
                instruction: cmd.instruction,
            }));
        }
        self.mapped = true;
        self.mapped_entries += 1;
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
        self.memory
            .get(offset as usize)
            .copied()
            .ok_or(Error::BusError(BusFailure::TransferFailed {
                instruction: opcodes::QIOR,
            }))
    }

    fn delay_us(&mut self, _us: u32) {}
}
