//! Protocol implementations
//!
//! This module contains the W25Q64JV command sequences: status polling,
//! write enable, reset, erase, page program and memory-mapped read setup.

mod w25q;

pub use w25q::*;
