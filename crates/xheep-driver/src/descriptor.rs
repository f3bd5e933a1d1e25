//! Transfer descriptors for the two handshake phases
//!
//! The tile only accepts two access shapes: a code fetch that copies the
//! flattened firmware into tile RAM, and a boot-and-execute that releases the
//! boot ROM loop. Descriptors are built through the two constructors below
//! and consumed by value, so a descriptor can never be reused or half-filled.

use tracing::debug;
use xheep_tile::regs::coherence;
use xheep_tile::WORD_BYTES;

/// Handshake phase a descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Copy the firmware buffer into tile RAM
    CodeFetch,
    /// Release the boot loop and let the firmware run
    BootExecute,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeFetch => write!(f, "code fetch"),
            Self::BootExecute => write!(f, "boot and execute"),
        }
    }
}

/// Hardware cache-coherence policy for the socket DMA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coherence {
    /// Non-coherent (the only mode the tile is driven with)
    #[default]
    None,
}

impl Coherence {
    /// Value written to the socket coherence register
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::None => coherence::NONE,
        }
    }
}

/// Boot control fields of an access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootControl {
    /// 1 = copy code from the bound buffer into tile RAM
    pub fetch_code: u32,
    /// Tile address the code lands at
    pub fetch_code_addr: u32,
    /// 1 = release the boot ROM wait loop
    pub exit_loop: u32,
    /// Number of 32-bit words to fetch
    pub code_size_words: u32,
}

/// One accelerator access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    phase: Phase,
    boot: BootControl,
    run: bool,
    src_offset: u32,
    dst_offset: u32,
    coherence: Coherence,
}

impl TransferDescriptor {
    /// Code fetch of a `buffer_len` byte firmware buffer
    ///
    /// `code_size_words = buffer_len / 4`; the buffer length is always a
    /// multiple of 8 when it comes from the assembler. Lengths beyond the
    /// 32-bit word counter saturate.
    #[must_use]
    pub fn code_fetch(buffer_len: usize) -> Self {
        let words = u32::try_from(buffer_len / WORD_BYTES).unwrap_or(u32::MAX);
        Self {
            phase: Phase::CodeFetch,
            boot: BootControl {
                fetch_code: 1,
                fetch_code_addr: 0,
                exit_loop: 0,
                code_size_words: words,
            },
            run: true,
            src_offset: 0,
            dst_offset: 0,
            coherence: Coherence::None,
        }
    }

    /// Boot-and-execute against the output buffer
    #[must_use]
    pub fn boot_execute() -> Self {
        Self {
            phase: Phase::BootExecute,
            boot: BootControl {
                fetch_code: 0,
                fetch_code_addr: 0,
                exit_loop: 1,
                code_size_words: 0,
            },
            run: true,
            src_offset: 0,
            dst_offset: 0,
            coherence: Coherence::None,
        }
    }

    /// Phase this descriptor drives
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Boot control fields
    #[must_use]
    pub const fn boot(&self) -> &BootControl {
        &self.boot
    }

    /// Whether the socket is started
    #[must_use]
    pub const fn run(&self) -> bool {
        self.run
    }

    /// Source byte offset
    #[must_use]
    pub const fn src_offset(&self) -> u32 {
        self.src_offset
    }

    /// Destination byte offset
    #[must_use]
    pub const fn dst_offset(&self) -> u32 {
        self.dst_offset
    }

    /// Coherence mode
    #[must_use]
    pub const fn coherence(&self) -> Coherence {
        self.coherence
    }

    /// Log every field at debug level
    pub fn trace(&self, khandle: u64) {
        debug!("{} configuration:", self.phase);
        debug!(
            "  code_size_words:      {} ({:#x})",
            self.boot.code_size_words, self.boot.code_size_words
        );
        debug!("  boot_fetch_code_addr: {:#x}", self.boot.fetch_code_addr);
        debug!("  boot_fetch_code:      {}", self.boot.fetch_code);
        debug!("  boot_exit_loop:       {}", self.boot.exit_loop);
        debug!("  contig handle:        {khandle:#x}");
        debug!("  src_offset:           {:#x}", self.src_offset);
        debug!("  dst_offset:           {:#x}", self.dst_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fetch_fields() {
        let desc = TransferDescriptor::code_fetch(0x2000);
        assert_eq!(desc.phase(), Phase::CodeFetch);
        assert_eq!(
            *desc.boot(),
            BootControl {
                fetch_code: 1,
                fetch_code_addr: 0,
                exit_loop: 0,
                code_size_words: 0x800,
            }
        );
        assert!(desc.run());
        assert_eq!(desc.src_offset(), 0);
        assert_eq!(desc.dst_offset(), 0);
        assert_eq!(desc.coherence(), Coherence::None);
    }

    #[test]
    fn boot_execute_fields() {
        let desc = TransferDescriptor::boot_execute();
        assert_eq!(desc.phase(), Phase::BootExecute);
        assert_eq!(desc.boot().fetch_code, 0);
        assert_eq!(desc.boot().exit_loop, 1);
        assert_eq!(desc.boot().code_size_words, 0);
        assert!(desc.run());
    }

    #[test]
    fn coherence_none_is_zero() {
        assert_eq!(Coherence::default().raw(), 0);
    }
}
