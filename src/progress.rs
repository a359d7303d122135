//! Progress reporting driven by session operations

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use qflash_core::flash::{Operation, OperationObserver};

/// Observer that advances a progress bar as operations complete
///
/// Commands open a bar sized to the whole job, then issue operations in
/// chunks; each successful operation advances the bar by its length.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
    pending: u64,
}

impl ProgressObserver {
    /// Create an observer with no bar attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a bar of `total` bytes labelled `label`
    pub fn start_bar(&mut self, total: u64, label: &str) {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                    label
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    /// Start a spinner for a single long operation
    pub fn start_spinner(&mut self, message: String) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(pb);
    }

    /// Finish the current bar with a message
    pub fn finish(&mut self, message: &'static str) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(message);
        }
    }

    /// Abandon the current bar with a message
    pub fn abandon(&mut self, message: &'static str) {
        if let Some(pb) = self.bar.take() {
            pb.abandon_with_message(message);
        }
    }
}

impl OperationObserver for ProgressObserver {
    fn started(&mut self, op: Operation, addr: u32, len: u32) {
        debug!("{:?} 0x{:08X} +0x{:X}", op, addr, len);
        self.pending = u64::from(len);
    }

    fn finished(&mut self, op: Operation, ok: bool) {
        if !ok {
            debug!("{:?} failed", op);
            return;
        }
        // Init and UnInit carry no length, so they never move the bar
        if let Some(pb) = &self.bar {
            pb.inc(self.pending);
        }
        self.pending = 0;
    }
}
