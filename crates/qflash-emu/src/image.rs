//! Backing image files for the emulated flash

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::{EmuConfig, EmulatedW25q};

/// Errors loading or saving a flash image
#[derive(Debug, Error)]
pub enum EmuError {
    /// Reading or writing the image file failed
    #[error("image I/O error: {0}")]
    Io(#[from] io::Error),
    /// The image does not fit into the emulated device
    #[error("image is {size} bytes but the device holds {capacity}")]
    ImageTooLarge {
        /// Image size in bytes
        size: usize,
        /// Device capacity in bytes
        capacity: usize,
    },
}

impl EmulatedW25q {
    /// Create a device backed by the image at `path`
    ///
    /// A missing file yields an erased device. A shorter image fills the
    /// start of the device and leaves the rest erased.
    pub fn load_image(config: EmuConfig, path: &Path) -> Result<Self, EmuError> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(
                    "{} not found, starting with an erased device",
                    path.display()
                );
                return Ok(Self::new(config));
            }
            Err(e) => return Err(e.into()),
        };

        let capacity = config.geometry.capacity as usize;
        if contents.len() > capacity {
            return Err(EmuError::ImageTooLarge {
                size: contents.len(),
                capacity,
            });
        }
        Ok(Self::with_data(config, &contents))
    }

    /// Write the whole device contents to `path`
    pub fn save_image(&self, path: &Path) -> Result<(), EmuError> {
        fs::write(path, self.data())?;
        Ok(())
    }
}
