//! Kernel backend for X-HEEP tiles
//!
//! Lowers each descriptor to `struct xheep_rtl_access` and hands it to the
//! ESP driver. The driver programs the socket registers, starts the
//! accelerator and sleeps until the tile raises its done interrupt, so the
//! ioctl returns only once the access has completed.

use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::abi::{ioctls, XheepRtlAccess};
use crate::backend::{BackendType, TileBackend};
use crate::buffer::DmaBuffer;
use crate::descriptor::TransferDescriptor;
use crate::device::XheepDevice;
use crate::error::{Result, XheepError};

/// Kernel driver backend
///
/// Uses `/dev/xheep_rtl.*` device nodes via the ESP accelerator driver
#[derive(Debug)]
pub struct KernelBackend {
    device: XheepDevice,
}

impl KernelBackend {
    /// Open the tile at `path`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` or an I/O error if the node cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Initializing kernel backend for {}", path.as_ref().display());
        XheepDevice::open(path).map(Self::from_device)
    }

    /// Wrap an already opened device, e.g. one from [`DeviceManager::open_first`]
    ///
    /// [`DeviceManager::open_first`]: crate::DeviceManager::open_first
    #[must_use]
    pub const fn from_device(device: XheepDevice) -> Self {
        Self { device }
    }

    /// Underlying device
    #[must_use]
    pub const fn device(&self) -> &XheepDevice {
        &self.device
    }
}

impl TileBackend for KernelBackend {
    fn transfer(
        &mut self,
        descriptor: TransferDescriptor,
        buffer: &mut dyn DmaBuffer,
    ) -> Result<()> {
        let phase = descriptor.phase();
        let khandle = buffer.khandle();
        descriptor.trace(khandle);

        let mut access = XheepRtlAccess::from_descriptor(&descriptor, khandle);

        // SAFETY: XHEEP_RTL_IOC_ACCESS copies a struct xheep_rtl_access from
        // user memory. Invariants: (1) fd is open for the lifetime of self;
        // (2) access is a live #[repr(C)] value whose size is encoded in the
        // request; (3) the bound buffer is borrowed mutably for the whole
        // blocking call, so nothing else touches the DMA memory meanwhile.
        let ret = unsafe {
            libc::ioctl(
                self.device.as_raw_fd(),
                ioctls::XHEEP_RTL_IOC_ACCESS as _,
                &raw mut access,
            )
        };

        if ret < 0 {
            let err = std::io::Error::last_os_error();
            tracing::error!("{phase} ioctl failed: {err}");
            return Err(XheepError::transfer_failed(
                phase,
                format!("XHEEP_RTL_IOC_ACCESS: {err}"),
            ));
        }

        tracing::debug!("{phase} completed on {}", self.device.path().display());
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Kernel
    }

    fn describe(&self) -> String {
        format!("ESP kernel driver at {}", self.device.path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferAllocator, HeapAllocator};
    use crate::descriptor::Phase;

    #[test]
    fn missing_device_fails_to_open() {
        assert!(matches!(
            KernelBackend::open("/nonexistent/xheep_rtl.0"),
            Err(XheepError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn ioctl_on_regular_file_is_transfer_failure() {
        // A plain file rejects unknown ioctls with ENOTTY.
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut backend = KernelBackend::open(file.path()).unwrap();
        let mut buffer = HeapAllocator::new().alloc(64).unwrap();

        let err = backend
            .transfer(TransferDescriptor::code_fetch(64), buffer.as_mut())
            .unwrap_err();
        assert!(matches!(
            err,
            XheepError::TransferFailed {
                phase: Phase::CodeFetch,
                ..
            }
        ));
        assert!(backend.describe().contains("ESP kernel driver"));
    }

    #[test]
    fn wraps_discovered_device() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xheep_rtl.0"), b"").unwrap();
        let device = crate::DeviceManager::discover_in(dir.path())
            .unwrap()
            .open_first()
            .unwrap();

        let mut backend = KernelBackend::from_device(device);
        assert_eq!(backend.device().path(), dir.path().join("xheep_rtl.0"));
        assert_eq!(backend.backend_type(), BackendType::Kernel);

        let mut buffer = HeapAllocator::new().alloc(0xFA90).unwrap();
        assert!(matches!(
            backend.transfer(TransferDescriptor::boot_execute(), buffer.as_mut()),
            Err(XheepError::TransferFailed {
                phase: Phase::BootExecute,
                ..
            })
        ));
    }
}
