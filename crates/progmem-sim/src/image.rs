//! Loading and saving the simulated array as a raw image file

use std::fs;
use std::path::Path;

use crate::error::{Result, SimError};
use crate::{SimConfig, SimController};

impl SimController {
    /// Create a controller whose array is loaded from `path`
    ///
    /// A missing file gives an erased array; the file is created on the
    /// first [`SimController::save_image`].
    pub fn open_image(config: SimConfig, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let sim = Self::new(config);
        if path.exists() {
            sim.load_image(path)?;
        } else {
            log::info!("{} does not exist, starting from an erased array", path.display());
        }
        Ok(sim)
    }

    /// Replace the array with the contents of `path`
    ///
    /// The file must be exactly the size of the array.
    pub fn load_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = fs::read(path).map_err(|source| SimError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;

        self.with_array(|array| {
            if image.len() != array.len() {
                return Err(SimError::ImageSize {
                    expected: array.len(),
                    found: image.len(),
                });
            }
            array.copy_from_slice(&image);
            Ok(())
        })?;
        log::debug!("loaded {} bytes from {}", image.len(), path.display());
        Ok(())
    }

    /// Write the array to `path`
    pub fn save_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = self.data();
        fs::write(path, &data).map_err(|source| SimError::ImageWrite {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("saved {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}
