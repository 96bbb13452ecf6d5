//! Removable medium holding the firmware image
//!
//! The medium is a directory standing in for the card's filesystem. It may
//! show up late, so mounting waits up to the connect timeout before giving
//! up with [`MediaError::NoCard`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use hexboot_core::boot::BootError;
use thiserror::Error;

/// Poll interval while waiting for the medium
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors accessing the medium
#[derive(Debug, Error)]
pub enum MediaError {
    /// Medium did not appear before the timeout
    #[error("No card at {0:?}")]
    NoCard(PathBuf),

    /// Medium exists but cannot be read as a filesystem
    #[error("Unreadable filesystem at {path:?}: {source}")]
    BadFilesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Firmware file not present or not openable
    #[error("No firmware file {path:?}: {source}")]
    NoFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MediaError {
    /// Indicator code for this failure
    pub fn boot_error(&self) -> BootError {
        match self {
            Self::NoCard(_) => BootError::NoCard,
            Self::BadFilesystem { .. } => BootError::BadFilesystem,
            Self::NoFile { .. } => BootError::NoFile,
        }
    }
}

/// A mounted medium
#[derive(Debug)]
pub struct Medium {
    root: PathBuf,
}

impl Medium {
    /// Wait for the medium at `root` and mount it
    pub fn mount(root: &Path, timeout: Duration) -> Result<Self, MediaError> {
        let deadline = Instant::now() + timeout;
        while !root.exists() {
            if Instant::now() >= deadline {
                log::warn!("No card at {:?} after {:?}", root, timeout);
                return Err(MediaError::NoCard(root.to_path_buf()));
            }
            thread::sleep(POLL_INTERVAL);
        }

        let bad_fs = |source: io::Error| MediaError::BadFilesystem {
            path: root.to_path_buf(),
            source,
        };
        let meta = fs::metadata(root).map_err(bad_fs)?;
        if !meta.is_dir() {
            return Err(bad_fs(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }
        // Listing proves the filesystem is readable
        fs::read_dir(root).map_err(bad_fs)?;

        log::info!("Mounted card at {:?}", root);
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Path of a file on the medium
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read a firmware file completely
    pub fn read_firmware(&self, name: &str) -> Result<Vec<u8>, MediaError> {
        let path = self.path(name);
        let data = fs::read(&path).map_err(|source| MediaError::NoFile {
            path: path.clone(),
            source,
        })?;
        log::info!("Read {} bytes from {:?}", data.len(), path);
        Ok(data)
    }

    /// Delete a firmware file so it is not flashed again on the next boot
    pub fn remove_firmware(&self, name: &str) -> io::Result<()> {
        let path = self.path(name);
        fs::remove_file(&path)?;
        log::info!("Removed {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hexboot-media-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_medium_is_no_card() {
        let dir = scratch("missing");
        let err = Medium::mount(&dir, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, MediaError::NoCard(_)));
        assert_eq!(err.boot_error(), BootError::NoCard);
    }

    #[test]
    fn test_file_instead_of_directory_is_bad_filesystem() {
        let dir = scratch("file");
        fs::write(&dir, b"not a card").unwrap();
        let err = Medium::mount(&dir, Duration::ZERO).unwrap_err();
        assert_eq!(err.boot_error(), BootError::BadFilesystem);
        fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn test_firmware_lifecycle() {
        let dir = scratch("firmware");
        fs::create_dir_all(&dir).unwrap();
        let medium = Medium::mount(&dir, Duration::ZERO).unwrap();

        let err = medium.read_firmware("ch.hex").unwrap_err();
        assert_eq!(err.boot_error(), BootError::NoFile);

        fs::write(dir.join("ch.hex"), b":00000001FF\n").unwrap();
        assert_eq!(medium.read_firmware("ch.hex").unwrap(), b":00000001FF\n");
        medium.remove_firmware("ch.hex").unwrap();
        assert!(!dir.join("ch.hex").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
