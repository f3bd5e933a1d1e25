//! Contract model of the X-HEEP tile as seen from an ESP host.
//!
//! This crate has **no dependencies** and **no hardware access**. It records
//! the numbers both sides of the socket have to agree on: the accelerator
//! register block the kernel driver programs, the X-HEEP `soc_ctrl` block the
//! tile firmware pokes, and the byte layout of the shared memory window the
//! firmware leaves its results in.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | ESP socket register map (common block + X-HEEP user registers) |
//! | [`soc_ctrl`] | X-HEEP `soc_ctrl` register offsets used by the boot ROM |
//! | [`memmap`] | Shared memory window: message, result block, boot control |
//! | [`align`] | Alignment helpers shared by buffer sizing code |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod align;
pub mod memmap;
pub mod regs;
pub mod soc_ctrl;

/// Name the ESP device tree gives the X-HEEP accelerator.
pub const DEVICE_NAME: &str = "xheep_rtl";

/// Default device node for the first X-HEEP tile.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/xheep_rtl.0";

/// Device node of the ESP contiguous memory allocator.
pub const DEFAULT_CONTIG_PATH: &str = "/dev/contig_alloc";

/// Size of one tile word in bytes. Code sizes are expressed in these.
pub const WORD_BYTES: usize = 4;
