//! qflash-core - Quad-SPI NOR flash programming algorithm
//!
//! This crate erases, programs, verifies and blank-checks an external
//! serial NOR flash (Winbond W25Q64JV class) through a quad-SPI controller.
//! It is `no_std` so the same engine can run inside a target-resident
//! download algorithm or on a host against an emulated bus.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error`, serde)
//! - `serde` - Derive serde traits for geometry and timing configuration
//!
//! # Example
//!
//! ```ignore
//! use qflash_core::flash::{FlashSession, Function, SessionConfig};
//!
//! fn flash_image<B: QspiBus>(bus: B, base: u32, image: &[u8]) -> qflash_core::Result<()> {
//!     let mut session = FlashSession::new(bus, SessionConfig::default())?;
//!     session.init(base, 100_000_000, Function::Program)?;
//!     session.erase_range(base, image.len() as u32)?;
//!     session.program(base, image)?;
//!     assert!(session.verify(base, image)?.is_match());
//!     session.uninit(Function::Program)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod algo;
pub mod bus;
pub mod error;
pub mod flash;
pub mod protocol;
pub mod qspi;

pub use error::{Error, Result};
