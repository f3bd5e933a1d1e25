//! End-to-end run of one firmware image on one tile
//!
//! Resource order is fixed: firmware buffer, output buffer, device. All three
//! are owned locals, so whichever step fails, everything acquired so far is
//! released exactly once when the function returns. Allocation happens
//! before the device is opened, so an allocation failure never touches
//! hardware.

use tracing::{debug, info, warn};
use xheep_tile::align::align_up_8;
use xheep_tile::memmap::{
    SHARED_RES_BYTES, SHARED_RES_OFFSET, SHARED_STR_MAX, SHARED_STR_OFFSET,
};

use crate::backend::{open_backend, BackendType, TileBackend};
use crate::backends::software::TileProgram;
use crate::buffer::BufferAllocator;
use crate::config::TileConfig;
use crate::error::{Result, XheepError};
use crate::firmware::{flatten_into, required_size, AssemblyWarning, Section};
use crate::handshake::{Handshake, HandshakeReport};
use crate::results::{hex_dump, region, ResultBlock, SharedMessage};

/// Firmware variant being run, which decides how results are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    /// Greeting written to the shared message region
    Hello,
    /// Seizure-detection CNN writing the result block
    SeizureCnn,
}

impl Application {
    /// Offset and length of the output region this variant reads
    #[must_use]
    pub const fn result_region(self) -> (usize, usize) {
        match self {
            Self::Hello => (SHARED_STR_OFFSET, SHARED_STR_MAX),
            Self::SeizureCnn => (SHARED_RES_OFFSET, SHARED_RES_BYTES),
        }
    }

    /// Output buffer size: end of the region this variant reads, rounded to 8
    #[must_use]
    pub fn output_buffer_size(self) -> usize {
        let (offset, len) = self.result_region();
        let end = offset + len;
        align_up_8(end).unwrap_or(end)
    }

    /// Read and validate this variant's results from `output`
    ///
    /// # Errors
    ///
    /// Returns `OutputTooSmall` if `output` does not cover the region.
    pub fn evaluate(self, output: &[u8]) -> Result<Evaluation> {
        match self {
            Self::Hello => SharedMessage::read_from(output).map(Evaluation::Hello),
            Self::SeizureCnn => ResultBlock::read_from(output).map(Evaluation::SeizureCnn),
        }
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hello => write!(f, "hello"),
            Self::SeizureCnn => write!(f, "seizure-cnn"),
        }
    }
}

/// Decoded results of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Message left by the hello firmware
    Hello(SharedMessage),
    /// Result block left by the CNN firmware
    SeizureCnn(ResultBlock),
}

impl Evaluation {
    /// Soft errors found while validating
    #[must_use]
    pub fn soft_errors(&self) -> u32 {
        match self {
            Self::Hello(message) => message.soft_errors(),
            Self::SeizureCnn(block) => block.soft_errors(),
        }
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hello(message) => write!(f, "message: {:?}", message.text()),
            Self::SeizureCnn(block) => write!(
                f,
                "prediction: {} ({}), cycles: {}, fc1_out: [{}, {}]",
                block.prediction,
                block.classification(),
                block.cycles,
                block.fc1_out[0],
                block.fc1_out[1]
            ),
        }
    }
}

/// Everything a finished run reports
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Variant that ran
    pub application: Application,
    /// Backend that ran it
    pub backend: BackendType,
    /// Decoded results
    pub evaluation: Evaluation,
    /// Validation failures (0 = pass)
    pub soft_errors: u32,
    /// Phase timings
    pub timings: HandshakeReport,
    /// Advisory warnings from flattening the firmware
    pub warnings: Vec<AssemblyWarning>,
    /// Size of the flattened firmware buffer
    pub firmware_size: usize,
    /// Output buffer offset of `raw_results`
    pub raw_offset: usize,
    /// Undecoded bytes of the region that was read
    pub raw_results: Vec<u8>,
}

impl Outcome {
    /// Process exit status: the soft error count
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.soft_errors).unwrap_or(i32::MAX)
    }

    /// True if validation found nothing wrong
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.soft_errors == 0
    }

    /// Hex dump of the raw result region, labelled with output buffer offsets
    #[must_use]
    pub fn hex_dump(&self) -> String {
        hex_dump(&self.raw_results, self.raw_offset)
    }
}

/// One firmware run against one tile
#[derive(Debug, Clone, Copy)]
pub struct Session {
    application: Application,
}

impl Session {
    /// Session for `application`
    #[must_use]
    pub const fn new(application: Application) -> Self {
        Self { application }
    }

    /// Variant this session runs
    #[must_use]
    pub const fn application(&self) -> Application {
        self.application
    }

    /// Assemble, allocate, handshake, decode
    ///
    /// `open_backend` is only called once both buffers exist.
    ///
    /// # Errors
    ///
    /// Any fatal error: empty firmware, allocation, device open, either
    /// transfer, or an output buffer too small to decode.
    pub fn run<F>(
        &self,
        sections: &[Section],
        allocator: &mut dyn BufferAllocator,
        open_backend: F,
    ) -> Result<Outcome>
    where
        F: FnOnce() -> Result<Box<dyn TileBackend>>,
    {
        let application = self.application;
        let firmware_size = required_size(sections)?;
        if firmware_size == 0 {
            return Err(XheepError::EmptyFirmware);
        }
        let output_size = application.output_buffer_size();
        info!(
            "Running {application}: firmware {firmware_size:#x} bytes, output {output_size:#x} bytes"
        );

        let mut firmware = allocator.alloc(firmware_size)?;
        let mut output = allocator.alloc(output_size)?;

        let warnings = flatten_into(sections, firmware.as_mut_slice());
        for warning in &warnings {
            warn!("Firmware: {warning}");
        }

        let mut backend = open_backend()?;
        let backend_type = backend.backend_type();
        info!("Backend: {}", backend.describe());

        let timings =
            Handshake::new(backend.as_mut()).run(firmware.as_mut(), output.as_mut())?;

        let evaluation = application.evaluate(output.as_slice())?;
        let (raw_offset, raw_len) = application.result_region();
        let raw_results = region(output.as_slice(), raw_offset, raw_len)?.to_vec();
        debug!("Raw results:\n{}", hex_dump(&raw_results, raw_offset));
        let soft_errors = evaluation.soft_errors();
        if soft_errors > 0 {
            warn!("{application}: {soft_errors} validation error(s): {evaluation}");
        } else {
            info!("{application}: {evaluation}");
        }

        Ok(Outcome {
            application,
            backend: backend_type,
            evaluation,
            soft_errors,
            timings,
            warnings,
            firmware_size,
            raw_offset,
            raw_results,
        })
    }

    /// Run with the backend and allocator `config` selects
    ///
    /// # Errors
    ///
    /// See [`Session::run`].
    pub fn run_configured(
        &self,
        config: &TileConfig,
        sections: &[Section],
        program: Box<dyn TileProgram>,
    ) -> Result<Outcome> {
        let backend_type = config.backend.resolve(config);
        let mut allocator = backend_type.allocator(config);
        self.run(sections, allocator.as_mut(), || {
            open_backend(backend_type, config, program)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sizes() {
        assert_eq!(Application::Hello.output_buffer_size(), 0xFA80);
        assert_eq!(Application::SeizureCnn.output_buffer_size(), 0xFA90);
        assert_eq!(Application::Hello.result_region(), (0xFA00, 128));
        assert_eq!(Application::SeizureCnn.result_region(), (0xFA80, 16));
    }

    #[test]
    fn exit_code_is_soft_errors() {
        let outcome = Outcome {
            application: Application::SeizureCnn,
            backend: BackendType::Software,
            evaluation: Evaluation::SeizureCnn(ResultBlock {
                prediction: 2,
                ..ResultBlock::default()
            }),
            soft_errors: 1,
            timings: HandshakeReport {
                code_fetch: crate::handshake::PhaseTiming {
                    phase: crate::descriptor::Phase::CodeFetch,
                    elapsed: std::time::Duration::ZERO,
                },
                boot_execute: crate::handshake::PhaseTiming {
                    phase: crate::descriptor::Phase::BootExecute,
                    elapsed: std::time::Duration::ZERO,
                },
            },
            warnings: Vec::new(),
            firmware_size: 8,
            raw_offset: SHARED_RES_OFFSET,
            raw_results: vec![2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        };
        assert_eq!(outcome.exit_code(), 1);
        assert!(!outcome.passed());
        assert_eq!(
            outcome.hex_dump(),
            "0xfa80: 02 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00\n"
        );
    }

    #[test]
    fn evaluation_display() {
        let eval = Evaluation::SeizureCnn(ResultBlock {
            prediction: 1,
            cycles: 1234,
            fc1_out: [5, -3],
        });
        assert_eq!(
            eval.to_string(),
            "prediction: 1 (Seizure), cycles: 1234, fc1_out: [5, -3]"
        );
    }
}
