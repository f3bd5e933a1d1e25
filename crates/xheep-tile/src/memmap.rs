//! Shared memory window between host and tile.
//!
//! Offsets are relative to the start of the X-HEEP aperture, which is also
//! the start of the host output buffer bound during boot-and-execute.
//!
//! ```text
//! 0x0000_0180  FW_ENTRY_POINT        firmware entry (linker __boot_address)
//! 0x0000_FA00  SHARED_STR_OFFSET     128-byte message region
//! 0x0000_FA80  SHARED_RES_OFFSET     4-word result block
//! 0x0000_FF00  SOC_CTRL_WRITE_OFFSET soc_ctrl mirror written by firmware
//! ```

use crate::soc_ctrl;
use crate::WORD_BYTES;

/// Firmware entry point. Must match the linker script's `__boot_address`.
pub const FW_ENTRY_POINT: u32 = 0x180;

/// Start of the shared message region.
pub const SHARED_STR_OFFSET: usize = 0x0000_FA00;
/// Size of the shared message region in bytes.
pub const SHARED_STR_MAX: usize = 128;

/// Start of the result block, on the first 128-byte boundary after the message.
pub const SHARED_RES_OFFSET: usize = 0x0000_FA80;
/// Number of 32-bit words in the result block.
pub const SHARED_RES_WORDS: usize = 4;
/// Size of the result block in bytes.
pub const SHARED_RES_BYTES: usize = SHARED_RES_WORDS * WORD_BYTES;

/// Base of the `soc_ctrl` block as seen through the window.
pub const SOC_CTRL_WRITE_OFFSET: usize = 0x0000_FF00;

/// Window address of `soc_ctrl.BOOT_EXIT_LOOP`.
pub const BOOT_EXIT_LOOP_ADDR: usize = SOC_CTRL_WRITE_OFFSET + soc_ctrl::BOOT_EXIT_LOOP;
/// Window address of `soc_ctrl.BOOT_ADDRESS`.
pub const BOOT_ADDRESS_ADDR: usize = SOC_CTRL_WRITE_OFFSET + soc_ctrl::BOOT_ADDRESS;
/// Window address of `soc_ctrl.BOOT_SELECT`.
pub const BOOT_SELECT_ADDR: usize = SOC_CTRL_WRITE_OFFSET + soc_ctrl::BOOT_SELECT;

/// Size of tile RAM modelled by the host (64 KiB).
pub const TILE_RAM_BYTES: usize = 0x1_0000;

/// Byte layout of the result block.
pub mod result_block {
    /// Predicted class (0 = normal, 1 = seizure).
    pub const PREDICTION: usize = 0;
    /// Cycle count reported by the firmware.
    pub const CYCLES: usize = 4;
    /// First raw FC1 output (signed).
    pub const FC1_OUT_0: usize = 8;
    /// Second raw FC1 output (signed).
    pub const FC1_OUT_1: usize = 12;
}
