//! QSPI command structure

use super::{opcodes, AddressWidth, IoMode};

/// A single QSPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
/// Build commands through the named constructors; each one matches one
/// instruction of the device.
#[derive(Debug)]
pub struct QspiCommand<'a> {
    /// The instruction byte
    pub instruction: u8,

    /// Device-relative address (if any)
    pub address: Option<u32>,

    /// Address width
    pub address_width: AddressWidth,

    /// Line widths of the instruction, address and data phases
    pub io_mode: IoMode,

    /// Alternate byte sent after the address (if any)
    pub alternate: Option<u8>,

    /// Number of dummy cycles after address/alternate byte
    pub dummy_cycles: u8,

    /// Data to write after the header
    pub write_data: &'a [u8],

    /// Buffer to read into
    pub read_buf: &'a mut [u8],
}

impl<'a> QspiCommand<'a> {
    fn instruction_only(instruction: u8) -> Self {
        Self {
            instruction,
            address: None,
            address_width: AddressWidth::None,
            io_mode: IoMode::Single,
            alternate: None,
            dummy_cycles: 0,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Write Enable (no address, no data)
    pub fn write_enable() -> Self {
        Self::instruction_only(opcodes::WREN)
    }

    /// Read Status Register 1 into `buf`
    pub fn read_status(buf: &'a mut [u8]) -> Self {
        Self {
            read_buf: buf,
            ..Self::instruction_only(opcodes::RDSR)
        }
    }

    /// Page Program at a device-relative address, 1-1-1
    pub fn page_program(addr: u32, data: &'a [u8]) -> Self {
        Self {
            address: Some(addr),
            address_width: AddressWidth::ThreeByte,
            write_data: data,
            ..Self::instruction_only(opcodes::PP)
        }
    }

    /// 4KB Sector Erase at a device-relative address
    pub fn sector_erase(addr: u32) -> Self {
        Self::erase(opcodes::SE_20, addr)
    }

    /// 64KB Block Erase at a device-relative address
    pub fn block_erase(addr: u32) -> Self {
        Self::erase(opcodes::BE_D8, addr)
    }

    fn erase(instruction: u8, addr: u32) -> Self {
        Self {
            address: Some(addr),
            address_width: AddressWidth::ThreeByte,
            ..Self::instruction_only(instruction)
        }
    }

    /// Chip Erase (no address)
    pub fn chip_erase() -> Self {
        Self::instruction_only(opcodes::CE_C7)
    }

    /// Enable Reset
    pub fn enable_reset() -> Self {
        Self::instruction_only(opcodes::RSTEN)
    }

    /// Reset Device
    pub fn reset_device() -> Self {
        Self::instruction_only(opcodes::RST)
    }

    /// Fast Read Quad I/O configured for memory-mapped continuous read
    ///
    /// Address, mode byte and data all travel on four lines. There is no
    /// data buffer: the controller streams reads on demand.
    pub fn fast_read_quad_mapped() -> Self {
        Self {
            address: Some(0),
            address_width: AddressWidth::ThreeByte,
            io_mode: IoMode::QuadIo,
            alternate: Some(opcodes::QIOR_CONTINUOUS_MODE),
            dummy_cycles: opcodes::QIOR_DUMMY_CYCLES,
            ..Self::instruction_only(opcodes::QIOR)
        }
    }

    /// Read Manufacturer / Device ID into a two-byte buffer
    pub fn read_device_id(buf: &'a mut [u8]) -> Self {
        Self {
            address: Some(0),
            address_width: AddressWidth::ThreeByte,
            read_buf: buf,
            ..Self::instruction_only(opcodes::REMS)
        }
    }

    /// Read JEDEC ID into a three-byte buffer
    pub fn read_jedec_id(buf: &'a mut [u8]) -> Self {
        Self {
            read_buf: buf,
            ..Self::instruction_only(opcodes::RDID)
        }
    }

    /// Read Unique ID into an eight-byte buffer
    pub fn read_unique_id(buf: &'a mut [u8]) -> Self {
        Self {
            dummy_cycles: opcodes::RDUID_DUMMY_CYCLES,
            read_buf: buf,
            ..Self::instruction_only(opcodes::RDUID)
        }
    }

    /// Returns true if this command has a read phase
    pub fn has_read(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Returns true if this command has a write phase
    pub fn has_write(&self) -> bool {
        !self.write_data.is_empty()
    }

    /// Number of payload bytes (written or read)
    pub fn payload_len(&self) -> usize {
        self.write_data.len() + self.read_buf.len()
    }

    /// Length of the instruction/address/alternate header in bytes
    pub fn header_len(&self) -> usize {
        1 + self.address_width.bytes() as usize + usize::from(self.alternate.is_some())
    }

    /// Encode instruction, address and alternate byte into `buf`
    ///
    /// Returns the number of bytes written. `buf` must hold at least
    /// [`header_len`](Self::header_len) bytes.
    pub fn encode_header(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.instruction;
        let mut len = 1;
        if let Some(addr) = self.address {
            let width = self.address_width.bytes() as usize;
            self.address_width.encode(addr, &mut buf[len..len + width]);
            len += width;
        }
        if let Some(alt) = self.alternate {
            buf[len] = alt;
            len += 1;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_program_framing() {
        let data = [0xAA; 44];
        let cmd = QspiCommand::page_program(0x0100, &data);
        assert_eq!(cmd.instruction, opcodes::PP);
        assert_eq!(cmd.address, Some(0x0100));
        assert_eq!(cmd.io_mode, IoMode::Single);
        assert_eq!(cmd.payload_len(), 44);
        assert!(cmd.has_write());
        assert!(!cmd.has_read());
    }

    #[test]
    fn test_fast_read_mapped_framing() {
        let cmd = QspiCommand::fast_read_quad_mapped();
        assert_eq!(cmd.instruction, opcodes::QIOR);
        assert_eq!(cmd.io_mode, IoMode::QuadIo);
        assert_eq!(cmd.alternate, Some(0xF0));
        assert_eq!(cmd.dummy_cycles, 4);
        assert_eq!(cmd.payload_len(), 0);

        let mut header = [0u8; 8];
        let len = cmd.encode_header(&mut header);
        assert_eq!(&header[..len], &[0xEB, 0x00, 0x00, 0x00, 0xF0]);
        assert_eq!(len, cmd.header_len());
    }

    #[test]
    fn test_write_enable_has_no_phases() {
        let cmd = QspiCommand::write_enable();
        assert_eq!(cmd.address, None);
        assert_eq!(cmd.payload_len(), 0);
        assert_eq!(cmd.header_len(), 1);
    }

    #[test]
    fn test_sector_erase_header() {
        let cmd = QspiCommand::sector_erase(0x7F_F000);
        let mut header = [0u8; 4];
        assert_eq!(cmd.encode_header(&mut header), 4);
        assert_eq!(header, [0x20, 0x7F, 0xF0, 0x00]);
    }
}
