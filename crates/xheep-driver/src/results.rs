//! Decoding of what the tile firmware leaves in the output buffer
//!
//! The firmware writes plain 32-bit words at fixed offsets with no framing
//! and no version field. Decoding is a pure function of the buffer bytes.
//!
//! ```text
//! 0xFA00  message    128 bytes, NUL terminated
//! 0xFA80  prediction u32   class id (0 = normal, 1 = seizure)
//! 0xFA84  cycles     u32   cycle count of the inference
//! 0xFA88  fc1_out[0] i32   raw FC1 output, class 0
//! 0xFA8C  fc1_out[1] i32   raw FC1 output, class 1
//! ```

use std::borrow::Cow;

use xheep_tile::memmap::{
    result_block, SHARED_RES_BYTES, SHARED_RES_OFFSET, SHARED_STR_MAX, SHARED_STR_OFFSET,
};

use crate::error::{Result, XheepError};

/// Substring the hello firmware must leave in the message region
pub const EXPECTED_GREETING: &str = "Hello from X-Heep Native tile";

/// Borrow `len` bytes at `offset`, or report how much buffer was needed
pub(crate) fn region(output: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.saturating_add(len);
    output
        .get(offset..end)
        .ok_or(XheepError::OutputTooSmall {
            needed: end,
            actual: output.len(),
        })
}

fn word(bytes: &[u8; SHARED_RES_BYTES], offset: usize) -> [u8; 4] {
    [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]
}

/// Result block of the seizure-detection CNN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultBlock {
    /// Predicted class id
    pub prediction: u32,
    /// Cycles spent in inference
    pub cycles: u32,
    /// Raw FC1 outputs
    pub fc1_out: [i32; 2],
}

impl ResultBlock {
    /// Decode the 16 little-endian bytes of a result block
    #[must_use]
    pub fn decode(bytes: &[u8; SHARED_RES_BYTES]) -> Self {
        Self {
            prediction: u32::from_le_bytes(word(bytes, result_block::PREDICTION)),
            cycles: u32::from_le_bytes(word(bytes, result_block::CYCLES)),
            fc1_out: [
                i32::from_le_bytes(word(bytes, result_block::FC1_OUT_0)),
                i32::from_le_bytes(word(bytes, result_block::FC1_OUT_1)),
            ],
        }
    }

    /// Read the block from an output buffer
    ///
    /// # Errors
    ///
    /// Returns `OutputTooSmall` if the buffer ends before `0xFA90`.
    pub fn read_from(output: &[u8]) -> Result<Self> {
        let bytes = region(output, SHARED_RES_OFFSET, SHARED_RES_BYTES)?;
        let mut block = [0u8; SHARED_RES_BYTES];
        block.copy_from_slice(bytes);
        Ok(Self::decode(&block))
    }

    /// The block as the four words the firmware stores, in address order
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn words(&self) -> [u32; 4] {
        [
            self.prediction,
            self.cycles,
            self.fc1_out[0] as u32,
            self.fc1_out[1] as u32,
        ]
    }

    /// Class the prediction maps to
    #[must_use]
    pub const fn classification(&self) -> Classification {
        match self.prediction {
            0 => Classification::Normal,
            1 => Classification::Seizure,
            other => Classification::OutOfRange(other),
        }
    }

    /// Soft errors this block accounts for (prediction outside `0..=1`)
    #[must_use]
    pub const fn soft_errors(&self) -> u32 {
        match self.classification() {
            Classification::OutOfRange(_) => 1,
            _ => 0,
        }
    }
}

/// Outcome of the seizure-detection model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No seizure detected
    Normal,
    /// Seizure detected
    Seizure,
    /// Class id the model cannot produce
    OutOfRange(u32),
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Seizure => write!(f, "Seizure"),
            Self::OutOfRange(id) => write!(f, "out of range ({id})"),
        }
    }
}

/// Message left by the hello firmware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedMessage {
    bytes: Vec<u8>,
}

impl SharedMessage {
    /// Bytes of the message region up to the first NUL
    #[must_use]
    pub fn decode(region: &[u8]) -> Self {
        let len = region.iter().position(|&b| b == 0).unwrap_or(region.len());
        Self {
            bytes: region[..len].to_vec(),
        }
    }

    /// Read the message region from an output buffer
    ///
    /// # Errors
    ///
    /// Returns `OutputTooSmall` if the buffer ends before `0xFA80`.
    pub fn read_from(output: &[u8]) -> Result<Self> {
        region(output, SHARED_STR_OFFSET, SHARED_STR_MAX).map(Self::decode)
    }

    /// Raw message bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Message as text with trailing whitespace removed
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match String::from_utf8_lossy(&self.bytes) {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim_end()),
            Cow::Owned(s) => Cow::Owned(s.trim_end().to_string()),
        }
    }

    /// True if the message carries the expected greeting
    #[must_use]
    pub fn is_greeting(&self) -> bool {
        self.text().contains(EXPECTED_GREETING)
    }

    /// Soft errors this message accounts for
    #[must_use]
    pub fn soft_errors(&self) -> u32 {
        u32::from(!self.is_greeting())
    }
}

/// Hex dump of `bytes`, 16 per line, prefixed with their buffer offset
#[must_use]
pub fn hex_dump(bytes: &[u8], base: usize) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:#06x}:", base + line * 16);
        for b in chunk {
            let _ = write!(out, " {b:02x}");
        }
        out.push('\n');
    }
    out
}
