//! X-HEEP `soc_ctrl` register offsets.
//!
//! Written only by code running on the tile. The boot ROM spins on
//! `BOOT_EXIT_LOOP` and then jumps to `BOOT_ADDRESS`.

/// Boot select (0 = JTAG, 1 = flash).
pub const BOOT_SELECT: usize = 0x08;
/// Boot loop release.
pub const BOOT_EXIT_LOOP: usize = 0x0C;
/// Address the boot ROM jumps to once the loop is released.
pub const BOOT_ADDRESS: usize = 0x10;
/// System clock frequency in Hz.
pub const SYSTEM_FREQUENCY_HZ: usize = 0x1C;
