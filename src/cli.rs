//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal byte
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value 0x{:X} does not fit in a byte", value))
}

#[derive(Parser)]
#[command(name = "qflash")]
#[command(author, version, about = "Quad-SPI NOR flash programming algorithm host", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backing file of the emulated flash (created erased if missing)
    #[arg(long, global = true, default_value = "flash.bin")]
    pub image: PathBuf,

    /// Configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Address the flash is mapped at (overrides the configuration file)
    #[arg(long, global = true, value_parser = parse_hex_u32)]
    pub base: Option<u32>,

    /// Controller clock in Hz (overrides the configuration file)
    #[arg(long, global = true)]
    pub clock: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show device identification and geometry
    Info,

    /// Erase the whole chip or a range of sectors
    Erase {
        /// Erase the whole chip
        #[arg(long, conflicts_with_all = ["start", "length"])]
        chip: bool,

        /// Flash offset of the range (hex, e.g., 0x10000)
        #[arg(long, value_parser = parse_hex_u32)]
        start: Option<u32>,

        /// Length of the range (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Program a file into flash
    Program {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Flash offset to program at
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Don't erase the covered sectors first
        #[arg(long)]
        no_erase: bool,

        /// Verify after programming
        #[arg(long, default_value = "true")]
        verify: bool,
    },

    /// Verify flash contents against a file
    Verify {
        /// Input file path to verify against
        #[arg(short, long)]
        input: PathBuf,

        /// Flash offset the file was programmed at
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,
    },

    /// Check that a range holds only a fill pattern
    BlankCheck {
        /// Flash offset of the range
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Length of the range (defaults to the rest of the device)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,

        /// Expected fill byte
        #[arg(long, value_parser = parse_hex_u8, default_value = "0xFF")]
        pattern: u8,
    },

    /// Read flash contents to a file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Flash offset to start reading at
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes (defaults to the rest of the device)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Run a full erase/program/verify download the way a debug probe does
    Download {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Flash offset to download to
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Erase the whole chip instead of the covered sectors
        #[arg(long)]
        chip_erase: bool,
    },
}
