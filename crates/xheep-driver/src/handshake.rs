//! Two-phase boot handshake
//!
//! ```text
//!   Idle ──fetch_code──▶ CodeFetched ──boot_execute──▶ Booted
//! ```
//!
//! Each phase is one blocking transfer. Transitions only go forward; a failed
//! phase leaves the handshake where it was, and since the caller drops it on
//! error nothing is ever retried. Boot-and-execute is refused unless code
//! fetch completed, because the boot ROM would jump into empty RAM.

use std::time::{Duration, Instant};

use tracing::info;

use crate::backend::TileBackend;
use crate::buffer::DmaBuffer;
use crate::descriptor::{Phase, TransferDescriptor};
use crate::error::{Result, XheepError};

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing issued yet
    Idle,
    /// Firmware copied into tile RAM
    CodeFetched,
    /// Boot loop released and firmware completed
    Booted,
}

/// Wall-clock duration of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    /// Phase measured
    pub phase: Phase,
    /// Time spent inside the blocking transfer
    pub elapsed: Duration,
}

impl std::fmt::Display for PhaseTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ns", self.phase, self.elapsed.as_nanos())
    }
}

/// Timings of a completed handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReport {
    /// Code fetch timing
    pub code_fetch: PhaseTiming,
    /// Boot-and-execute timing
    pub boot_execute: PhaseTiming,
}

impl HandshakeReport {
    /// Both phases in issue order
    #[must_use]
    pub const fn timings(&self) -> [PhaseTiming; 2] {
        [self.code_fetch, self.boot_execute]
    }

    /// Sum of both phases
    #[must_use]
    pub fn total(&self) -> Duration {
        self.code_fetch.elapsed + self.boot_execute.elapsed
    }
}

/// Sequencer for the two accelerator accesses
#[derive(Debug)]
pub struct Handshake<'a> {
    backend: &'a mut dyn TileBackend,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Fresh handshake on `backend`
    pub fn new(backend: &'a mut dyn TileBackend) -> Self {
        Self {
            backend,
            state: HandshakeState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Phase 1: copy `firmware` into tile RAM
    ///
    /// # Errors
    ///
    /// `InvalidState` unless idle; `TransferFailed` if the access fails.
    pub fn fetch_code(&mut self, firmware: &mut dyn DmaBuffer) -> Result<PhaseTiming> {
        self.require(HandshakeState::Idle, Phase::CodeFetch)?;
        let descriptor = TransferDescriptor::code_fetch(firmware.len());
        let timing = self.issue(descriptor, firmware)?;
        self.state = HandshakeState::CodeFetched;
        Ok(timing)
    }

    /// Phase 2: release the boot loop with `output` bound as the sink
    ///
    /// # Errors
    ///
    /// `InvalidState` unless code was fetched; `TransferFailed` if the
    /// access fails.
    pub fn boot_execute(&mut self, output: &mut dyn DmaBuffer) -> Result<PhaseTiming> {
        self.require(HandshakeState::CodeFetched, Phase::BootExecute)?;
        let timing = self.issue(TransferDescriptor::boot_execute(), output)?;
        self.state = HandshakeState::Booted;
        Ok(timing)
    }

    /// Both phases in order; phase 2 is never issued if phase 1 fails
    ///
    /// # Errors
    ///
    /// Returns the first phase error.
    pub fn run(
        &mut self,
        firmware: &mut dyn DmaBuffer,
        output: &mut dyn DmaBuffer,
    ) -> Result<HandshakeReport> {
        let code_fetch = self.fetch_code(firmware)?;
        let boot_execute = self.boot_execute(output)?;
        Ok(HandshakeReport {
            code_fetch,
            boot_execute,
        })
    }

    fn require(&self, required: HandshakeState, phase: Phase) -> Result<()> {
        if self.state == required {
            Ok(())
        } else {
            Err(XheepError::invalid_state(format!(
                "{phase} requires {required:?}, handshake is {:?}",
                self.state
            )))
        }
    }

    fn issue(
        &mut self,
        descriptor: TransferDescriptor,
        buffer: &mut dyn DmaBuffer,
    ) -> Result<PhaseTiming> {
        let phase = descriptor.phase();
        info!("{phase}: {} bytes bound, handle {:#x}", buffer.len(), buffer.khandle());

        let start = Instant::now();
        self.backend.transfer(descriptor, buffer)?;
        let elapsed = start.elapsed();

        info!("{phase} complete in {} ns", elapsed.as_nanos());
        Ok(PhaseTiming { phase, elapsed })
    }
}
