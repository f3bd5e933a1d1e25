//! Host-side driver for X-HEEP tiles on ESP.
//!
//! Loads a firmware image into an X-HEEP RISC-V tile through the ESP
//! accelerator driver, boots it, and decodes what the firmware leaves in the
//! shared output buffer.
//!
//! # Flow
//!
//! ```text
//! sections ──assemble──▶ firmware buffer ──code fetch──▶ tile RAM
//!                        output buffer   ◀──boot/execute── firmware
//!                              │
//!                              └──decode──▶ ResultBlock / SharedMessage
//! ```
//!
//! # Backends
//!
//! ```text
//! KernelBackend   : XHEEP_RTL_IOC_ACCESS on /dev/xheep_rtl.N, contig_alloc buffers
//! SoftwareBackend : simulated tile RAM and boot loop, heap buffers (CI)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use xheep_driver::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TileConfig::from_env();
//! let sections = firmware::load(&FirmwareSource::Elf("hello.elf".into()), config.load_base)?;
//!
//! let outcome = Session::new(Application::Hello).run_configured(
//!     &config,
//!     &sections,
//!     Box::new(HelloProgram::default()),
//! )?;
//! println!("{} ({} soft errors)", outcome.evaluation, outcome.soft_errors);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod abi;
mod backend;
pub mod backends;
pub mod buffer;
mod config;
pub mod contig;
pub mod descriptor;
mod device;
mod discovery;
mod error;
pub mod firmware;
pub mod handshake;
pub mod results;
pub mod session;

pub use backend::{
    open_backend, select_backend, BackendSelection, BackendType, TileBackend,
};
pub use backends::{HelloProgram, KernelBackend, SeizureCnnProgram, SoftwareBackend, TileProgram};
pub use buffer::{BufferAllocator, DmaBuffer, HeapAllocator};
pub use config::{parse_u32, TileConfig, ENV_BACKEND, ENV_CONTIG_DEVICE, ENV_DEVICE, ENV_LOAD_BASE};
pub use contig::ContigAllocator;
pub use descriptor::{Phase, TransferDescriptor};
pub use device::XheepDevice;
pub use discovery::{DeviceInfo, DeviceManager};
pub use error::{Result, XheepError};
pub use firmware::{AssemblyWarning, FirmwareImage, FirmwareSource, Section};
pub use handshake::{Handshake, HandshakeReport, HandshakeState, PhaseTiming};
pub use results::{Classification, ResultBlock, SharedMessage};
pub use session::{Application, Evaluation, Outcome, Session};

/// Tile contract constants (re-exported from xheep-tile).
pub use xheep_tile as tile;

/// Common imports
pub mod prelude {
    pub use crate::firmware;
    pub use crate::{
        Application, BackendSelection, BufferAllocator, DmaBuffer, FirmwareImage,
        FirmwareSource, HeapAllocator, HelloProgram, Section, SeizureCnnProgram, Session,
        SoftwareBackend, TileBackend, TileConfig, XheepError,
    };
}
