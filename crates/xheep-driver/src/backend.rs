//! Backend abstraction for X-HEEP tiles
//!
//! A backend performs one blocking accelerator access per call. The kernel
//! backend forwards it to the ESP driver; the software backend models the
//! tile so the whole stack runs in CI.

use std::fmt::Debug;
use std::str::FromStr;

use crate::backends::kernel::KernelBackend;
use crate::backends::software::{SoftwareBackend, TileProgram};
use crate::buffer::{BufferAllocator, DmaBuffer, HeapAllocator};
use crate::config::TileConfig;
use crate::contig::ContigAllocator;
use crate::descriptor::TransferDescriptor;
use crate::error::Result;

/// Tile backend trait - the device as an opaque "perform transfer" handle
pub trait TileBackend: Debug + Send {
    /// Issue one accelerator access bound to `buffer` and wait for completion
    ///
    /// # Errors
    ///
    /// Returns `TransferFailed` if the access is rejected or fails.
    fn transfer(&mut self, descriptor: TransferDescriptor, buffer: &mut dyn DmaBuffer)
        -> Result<()>;

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;

    /// Human-readable description of what the backend drives
    fn describe(&self) -> String;
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// ESP kernel driver (`/dev/xheep_rtl.*`)
    Kernel,

    /// Software tile model, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kernel => write!(f, "Kernel"),
            Self::Software => write!(f, "Software (simulated tile)"),
        }
    }
}

impl BackendType {
    /// Allocator whose buffers this backend can bind
    ///
    /// The kernel driver resolves contiguous-allocator handles only; the
    /// software model reads plain host memory.
    #[must_use]
    pub fn allocator(self, config: &TileConfig) -> Box<dyn BufferAllocator> {
        match self {
            Self::Kernel => Box::new(ContigAllocator::new(&config.contig_path)),
            Self::Software => Box::new(HeapAllocator::new()),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// Kernel if the device node exists, software otherwise
    #[default]
    Auto,

    /// Force kernel driver
    Kernel,

    /// Force software tile model - for CI and dry runs
    Software,
}

impl BackendSelection {
    /// Pick the concrete backend type for `config`
    #[must_use]
    pub fn resolve(self, config: &TileConfig) -> BackendType {
        match self {
            Self::Kernel => BackendType::Kernel,
            Self::Software => BackendType::Software,
            Self::Auto => {
                if config.device_path.exists() {
                    BackendType::Kernel
                } else {
                    tracing::warn!(
                        "{} not present, falling back to software tile",
                        config.device_path.display()
                    );
                    BackendType::Software
                }
            }
        }
    }
}

impl FromStr for BackendSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "kernel" => Ok(Self::Kernel),
            "software" | "sw" => Ok(Self::Software),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, kernel or software)"
            )),
        }
    }
}

/// Open a backend of the given type
///
/// `program` is what the software tile runs on boot; the kernel backend
/// ignores it because the real firmware is whatever was fetched.
///
/// # Errors
///
/// Returns error if the device cannot be opened.
pub fn open_backend(
    backend_type: BackendType,
    config: &TileConfig,
    program: Box<dyn TileProgram>,
) -> Result<Box<dyn TileBackend>> {
    match backend_type {
        BackendType::Kernel => {
            KernelBackend::open(&config.device_path).map(|b| Box::new(b) as Box<dyn TileBackend>)
        }
        BackendType::Software => Ok(Box::new(SoftwareBackend::new(program))),
    }
}

/// Resolve `selection` and open the resulting backend
///
/// # Errors
///
/// Returns error if the selected device cannot be opened.
pub fn select_backend(
    selection: BackendSelection,
    config: &TileConfig,
    program: Box<dyn TileProgram>,
) -> Result<Box<dyn TileBackend>> {
    let backend_type = selection.resolve(config);
    tracing::info!("Using {backend_type} backend");
    open_backend(backend_type, config, program)
}
