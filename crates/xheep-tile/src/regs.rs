//! ESP socket register map for the X-HEEP accelerator.
//!
//! The host never writes these directly. The `xheep_rtl` kernel driver copies
//! the fields of an access descriptor into them before starting the socket
//! DMA. They are recorded here so that the software tile model and the
//! descriptor dumps speak the same names.
//!
//! Values taken from the `xheep_rtl` driver are marked `// driver`.
//! Values from the generic ESP accelerator header are marked `// esp`.
//!
//! ```text
//! 0x30  SRC_OFFSET            byte offset into the bound buffer (read side)
//! 0x34  DST_OFFSET            byte offset into the bound buffer (write side)
//! 0x40  CODE_SIZE_WORDS       words to copy into tile RAM during code fetch
//! 0x44  BOOT_FETCH_CODE_ADDR  tile address the code lands at
//! 0x48  BOOT_FETCH_CODE       1 = copy code from host buffer
//! 0x4C  BOOT_EXIT_LOOP        1 = release the boot ROM wait loop
//! ```

// ── Common ESP socket block ─────────────────────────────────────────────────

/// Command register (start / reset).
pub const CMD: usize = 0x00; // esp
/// Coherence mode of the next transfer.
pub const COHERENCE: usize = 0x20; // esp
/// Source byte offset.
pub const SRC_OFFSET: usize = 0x30; // esp
/// Destination byte offset.
pub const DST_OFFSET: usize = 0x34; // esp

// ── X-HEEP user registers ───────────────────────────────────────────────────

/// Number of 32-bit words fetched into tile RAM. // driver
pub const CODE_SIZE_WORDS: usize = 0x40;
/// Tile address the fetched code is written to. // driver
pub const BOOT_FETCH_CODE_ADDR: usize = 0x44;
/// Code fetch enable. // driver
pub const BOOT_FETCH_CODE: usize = 0x48;
/// Boot loop release. // driver
pub const BOOT_EXIT_LOOP: usize = 0x4C;

/// First user register; everything below belongs to the ESP socket.
pub const USER_BASE: usize = CODE_SIZE_WORDS;

/// Coherence modes understood by the ESP socket.
pub mod coherence {
    /// Non-coherent DMA (the only mode the X-HEEP tile is used with).
    pub const NONE: u32 = 0;
}
