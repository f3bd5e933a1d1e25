//! X-HEEP device handle
//!
//! The ESP driver exposes each tile as a character device. The host only ever
//! issues one control operation on it, so the handle is little more than an
//! owned file descriptor that logs its own lifetime.

use rustix::fs::OFlags;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{Result, XheepError};

/// Open X-HEEP tile device
#[derive(Debug)]
pub struct XheepDevice {
    path: PathBuf,
    file: File,
}

impl XheepDevice {
    /// Open the device node at `path` for read/write
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if the node does not exist, or an I/O error
    /// if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Opening device {}", path.display());

        if !path.exists() {
            return Err(XheepError::device_not_found(path));
        }

        // Blocking descriptor: the access ioctl sleeps until the tile is done.
        #[allow(clippy::cast_possible_wrap)]
        let flags = OFlags::CLOEXEC.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(flags)
            .open(path)?;

        tracing::info!("Opened device {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Device node path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for XheepDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for XheepDevice {
    fn drop(&mut self) {
        tracing::info!("Closing device {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_node_is_not_found() {
        let err = XheepDevice::open("/nonexistent/xheep_rtl.0").unwrap_err();
        assert!(matches!(err, XheepError::DeviceNotFound { .. }));
    }

    #[test]
    fn opens_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let device = XheepDevice::open(file.path()).unwrap();
        assert_eq!(device.path(), file.path());
        assert!(device.as_raw_fd() >= 0);
    }

    #[test]
    fn node_opened_blocking_read_write_cloexec() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let device = XheepDevice::open(file.path()).unwrap();

        let status = rustix::fs::fcntl_getfl(&device.file).unwrap();
        assert!(status.contains(OFlags::RDWR));
        assert!(!status.contains(OFlags::NONBLOCK));

        let fd_flags = rustix::io::fcntl_getfd(&device.file).unwrap();
        assert!(fd_flags.contains(rustix::io::FdFlags::CLOEXEC));
    }
}
