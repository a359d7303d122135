//! Bus transport abstraction
//!
//! This module defines the trait a QSPI controller driver implements so the
//! protocol engine can drive it.

mod traits;

pub use traits::*;
