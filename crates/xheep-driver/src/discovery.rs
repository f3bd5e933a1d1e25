//! Runtime device discovery
//!
//! Scans `/dev/xheep_rtl.N` nodes. The ESP driver names them after the
//! device tree entry, one per tile, numbered from zero.

use std::path::{Path, PathBuf};

use xheep_tile::DEVICE_NAME;

use crate::device::XheepDevice;
use crate::error::{Result, XheepError};

/// Highest tile index probed
const MAX_TILES: usize = 16;

/// Device manager for runtime discovery and access
#[derive(Debug)]
pub struct DeviceManager {
    devices: Vec<DeviceInfo>,
}

/// Information about a discovered tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Tile index (the `N` in `xheep_rtl.N`)
    pub index: usize,

    /// Device file path
    pub path: PathBuf,
}

impl DeviceInfo {
    /// Device file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceManager {
    /// Discover all X-HEEP tiles under `/dev`
    ///
    /// # Errors
    ///
    /// Returns `XheepError::NoDevicesFound` if no devices are detected.
    pub fn discover() -> Result<Self> {
        Self::discover_in(Path::new("/dev"))
    }

    /// Discover tiles under an arbitrary directory
    ///
    /// # Errors
    ///
    /// Returns `XheepError::NoDevicesFound` if no devices are detected.
    pub fn discover_in(dir: &Path) -> Result<Self> {
        tracing::info!("Discovering X-HEEP devices in {}...", dir.display());

        let devices: Vec<DeviceInfo> = (0..MAX_TILES)
            .filter_map(|index| {
                let path = dir.join(format!("{DEVICE_NAME}.{index}"));
                path.exists().then(|| {
                    tracing::debug!("Found device file: {}", path.display());
                    DeviceInfo { index, path }
                })
            })
            .collect();

        if devices.is_empty() {
            tracing::warn!("No X-HEEP devices found");
            return Err(XheepError::NoDevicesFound);
        }

        tracing::info!("Discovered {} X-HEEP device(s)", devices.len());

        Ok(Self { devices })
    }

    /// Number of discovered devices
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// All discovered devices
    #[must_use]
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Open the first discovered device
    ///
    /// # Errors
    ///
    /// Returns an error if no devices are available or the device cannot be opened.
    pub fn open_first(&self) -> Result<XheepDevice> {
        let info = self.devices.first().ok_or(XheepError::NoDevicesFound)?;
        XheepDevice::open(&info.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DeviceManager::discover_in(dir.path()),
            Err(XheepError::NoDevicesFound)
        ));
    }

    #[test]
    fn finds_numbered_nodes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("xheep_rtl.2"), b"").unwrap();
        std::fs::write(dir.path().join("xheep_rtl.0"), b"").unwrap();
        std::fs::write(dir.path().join("other.1"), b"").unwrap();

        let manager = DeviceManager::discover_in(dir.path()).unwrap();
        let indices: Vec<usize> = manager.devices().iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(manager.device_count(), 2);

        let device = manager.open_first().unwrap();
        assert_eq!(device.path(), dir.path().join("xheep_rtl.0"));
    }

    #[test]
    fn test_discover_hardware() {
        let Ok(manager) = DeviceManager::discover() else {
            println!("Skipping test (no hardware)");
            return;
        };
        assert!(manager.device_count() > 0);
    }
}
