//! Error types for X-HEEP host operations

use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::Phase;

/// Result type alias for X-HEEP operations
pub type Result<T> = std::result::Result<T, XheepError>;

/// Errors that can occur while loading and booting a tile
///
/// Every variant is fatal for the session that produced it. Result
/// mismatches are not errors; they are counted in the session outcome.
#[derive(Debug, Error)]
pub enum XheepError {
    /// Device node not found at the expected path
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// No X-HEEP device nodes on the system
    #[error("No X-HEEP devices detected")]
    NoDevicesFound,

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Firmware has no sections to place
    #[error("Firmware image has no sections")]
    EmptyFirmware,

    /// A section cannot be represented in the tile address space
    #[error("Invalid firmware section {index}: {reason}")]
    InvalidSection {
        /// Position of the section in the table
        index: usize,
        /// Reason for rejection
        reason: String,
    },

    /// Firmware file could not be parsed
    #[error("Firmware parse error: {reason}")]
    Firmware {
        /// Reason for failure
        reason: String,
    },

    /// DMA buffer could not be allocated
    #[error("Failed to allocate {size} byte DMA buffer: {reason}")]
    AllocationFailed {
        /// Requested size in bytes
        size: usize,
        /// Reason for failure
        reason: String,
    },

    /// Accelerator access failed
    #[error("{phase} transfer failed: {reason}")]
    TransferFailed {
        /// Handshake phase that failed
        phase: Phase,
        /// Reason for failure
        reason: String,
    },

    /// Operation issued out of order
    #[error("Invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Output buffer does not cover the region being read
    #[error("Output buffer too small: need {needed} bytes, have {actual}")]
    OutputTooSmall {
        /// Bytes required to read the region
        needed: usize,
        /// Actual buffer length
        actual: usize,
    },
}

impl XheepError {
    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create an invalid section error
    pub fn invalid_section(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            index,
            reason: reason.into(),
        }
    }

    /// Create a firmware parse error
    pub fn firmware(reason: impl Into<String>) -> Self {
        Self::Firmware {
            reason: reason.into(),
        }
    }

    /// Create an allocation failed error
    pub fn allocation_failed(size: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            size,
            reason: reason.into(),
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(phase: Phase, reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            phase,
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}
