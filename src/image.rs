//! Flash contents persisted as a raw image file
//!
//! The emulated flash lives in a file holding exactly one byte per flash
//! byte. A missing file is created erased.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hexboot_core::geometry::{FlashGeometry, ERASED_BYTE};
use hexboot_sim::{SimFlash, SimRegisters};
use thiserror::Error;

/// Errors loading or saving a flash image
#[derive(Debug, Error)]
pub enum ImageError {
    /// Image file could not be read or written
    #[error("I/O error on flash image {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Image size does not match the flash layout
    #[error("Flash image {path:?} is {found} bytes, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// Open the flash image at `path`, creating an erased one if absent
pub fn open(path: &Path, geometry: FlashGeometry) -> Result<SimFlash, ImageError> {
    let io_err = |source: io::Error| ImageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let expected = geometry.size() as usize;

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("Creating erased flash image {:?} ({} bytes)", path, expected);
            let data = vec![ERASED_BYTE; expected];
            fs::write(path, &data).map_err(io_err)?;
            data
        }
        Err(e) => return Err(io_err(e)),
    };

    if data.len() != expected {
        return Err(ImageError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            found: data.len(),
        });
    }

    log::debug!("Loaded flash image {:?}", path);
    Ok(SimRegisters::with_image(geometry, &data).into_flash())
}

/// Write the flash contents back to `path`
pub fn save(path: &Path, flash: &SimFlash) -> Result<(), ImageError> {
    fs::write(path, flash.registers().image()).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Saved flash image {:?}", path);
    Ok(())
}
