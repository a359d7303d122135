//! Status register auto-polling configuration

use super::opcodes;

/// How the masked status bits are compared against the expected value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Every masked bit must equal the expected bit
    #[default]
    And,
    /// At least one masked bit must equal the expected bit
    Or,
}

/// A condition on a status register, sampled repeatedly until it holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoPollMatch {
    /// Instruction used to sample the register
    pub instruction: u8,
    /// Expected bit pattern
    pub expected: u8,
    /// Bits of the register that take part in the comparison
    pub mask: u8,
    /// Comparison mode
    pub mode: MatchMode,
    /// Delay between two samples, in microseconds
    pub interval_us: u32,
    /// Stop as soon as a sample matches
    pub stop_on_match: bool,
}

impl AutoPollMatch {
    /// Default delay between two status samples
    pub const DEFAULT_INTERVAL_US: u32 = 10;

    /// Device ready: WIP (bit 0) clear
    pub const fn ready() -> Self {
        Self {
            instruction: opcodes::RDSR,
            expected: 0x00,
            mask: opcodes::SR1_WIP,
            mode: MatchMode::And,
            interval_us: Self::DEFAULT_INTERVAL_US,
            stop_on_match: true,
        }
    }

    /// Write enable latch set: WEL (bit 1) set
    pub const fn write_enabled() -> Self {
        Self {
            instruction: opcodes::RDSR,
            expected: opcodes::SR1_WEL,
            mask: opcodes::SR1_WEL,
            mode: MatchMode::And,
            interval_us: Self::DEFAULT_INTERVAL_US,
            stop_on_match: true,
        }
    }

    /// Replace the sampling interval
    pub const fn with_interval_us(mut self, interval_us: u32) -> Self {
        self.interval_us = interval_us;
        self
    }

    /// Check a sampled status byte against this condition
    pub const fn matches(&self, status: u8) -> bool {
        let agreeing = !(status ^ self.expected) & self.mask;
        match self.mode {
            MatchMode::And => agreeing == self.mask,
            MatchMode::Or => agreeing != 0,
        }
    }
}
