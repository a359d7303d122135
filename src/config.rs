//! Host configuration file
//!
//! Parses configuration files in TOML format:
//!
//! ```toml
//! base_address = 0x90000000
//! clock_hz = 100_000_000
//!
//! [geometry]
//! capacity = 0x800000
//! block_size = 0x10000
//! sector_size = 0x1000
//! page_size = 0x100
//!
//! [timeouts]
//! sector_erase_us = 500_000
//! chip_erase_us = 200_000_000
//! ```
//!
//! Every key is optional. Setting `unbounded_chip_erase = true` removes the
//! chip-erase deadline.

use std::fs;
use std::io;
use std::path::Path;

use qflash_core::flash::SessionConfig;
use serde::Deserialize;
use thiserror::Error;

/// Address the QUADSPI bank is mapped at on STM32H7 parts
pub const DEFAULT_BASE_ADDRESS: u32 = 0x9000_0000;
/// Default controller clock
pub const DEFAULT_CLOCK_HZ: u32 = 100_000_000;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid TOML for this schema
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// The geometry section violates the nesting rules
    #[error("invalid geometry in config file: {0}")]
    Geometry(qflash_core::Error),
}

/// Everything the host needs to drive a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Address the host uses for flash offset 0
    pub base_address: u32,
    /// Controller clock handed to Init
    pub clock_hz: u32,
    /// Wait for a chip erase without a deadline
    pub unbounded_chip_erase: bool,
    /// Geometry and timing of the session
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_BASE_ADDRESS,
            clock_hz: DEFAULT_CLOCK_HZ,
            unbounded_chip_erase: false,
            session: SessionConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load a configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: HostConfig = toml::from_str(content)?;
        config
            .session
            .geometry
            .validate()
            .map_err(ConfigError::Geometry)?;
        if config.unbounded_chip_erase {
            config.session.timeouts.chip_erase_us = None;
        }
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, base: Option<u32>, clock_hz: Option<u32>) -> Self {
        if let Some(base) = base {
            self.base_address = base;
        }
        if let Some(clock_hz) = clock_hz {
            self.clock_hz = clock_hz;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflash_core::flash::FlashGeometry;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.session.geometry, FlashGeometry::W25Q64JV);
    }

    #[test]
    fn test_partial_overrides() {
        let config = HostConfig::from_toml_str(
            r#"
            base_address = 0x70000000
            reset_settle_ms = 5

            [timeouts]
            sector_erase_us = 800000
            "#,
        )
        .unwrap();
        assert_eq!(config.base_address, 0x7000_0000);
        assert_eq!(config.clock_hz, DEFAULT_CLOCK_HZ);
        assert_eq!(config.session.reset_settle_ms, 5);
        assert_eq!(config.session.timeouts.sector_erase_us, 800_000);
        assert_eq!(config.session.timeouts.page_program_us, 10_000);
    }

    #[test]
    fn test_unbounded_chip_erase() {
        let config = HostConfig::from_toml_str("unbounded_chip_erase = true").unwrap();
        assert_eq!(config.session.timeouts.chip_erase_us, None);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let err = HostConfig::from_toml_str(
            r#"
            [geometry]
            capacity = 0x800000
            block_size = 0x10000
            sector_size = 0x1000
            page_size = 0x300
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Geometry(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = HostConfig::from_toml_str("base_address = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = HostConfig::default().with_overrides(Some(0x1000), None);
        assert_eq!(config.base_address, 0x1000);
        assert_eq!(config.clock_hz, DEFAULT_CLOCK_HZ);
    }
}
