//! Tile backend implementations
//!
//! Two backends available:
//! - **Kernel**: `XHEEP_RTL_IOC_ACCESS` on `/dev/xheep_rtl.*` (requires the ESP driver)
//! - **Software**: simulated tile RAM and boot loop (CI, dry runs)

pub mod kernel;
pub mod software;

pub use kernel::KernelBackend;
pub use software::{HelloProgram, SeizureCnnProgram, SoftwareBackend, TileProgram, TileWindow};
