//! Software (simulated tile) backend
//!
//! Models just enough of the X-HEEP tile to run the host flow without an ESP
//! SoC:
//!
//! 1. **Socket registers**: each access is programmed into a register file
//!    the way the kernel driver's `prep_xfer` does, so tests can inspect
//!    what the hardware would have seen.
//!
//! 2. **Code fetch**: `code_size_words * 4` bytes are copied from the bound
//!    buffer into 64 KiB of tile RAM at `boot_fetch_code_addr`.
//!
//! 3. **Boot loop**: releasing the loop runs a [`TileProgram`] that stands in
//!    for the firmware and writes into the bound output buffer through
//!    32-bit stores, like the AXI slave port the real firmware uses.
//!
//! Booting a tile that never fetched code is an ordering error, not a
//! transfer error.

use std::collections::HashSet;
use std::fmt::Debug;

use tracing::{debug, info, warn};
use xheep_tile::memmap::{
    FW_ENTRY_POINT, SHARED_RES_OFFSET, SHARED_STR_MAX, SHARED_STR_OFFSET, TILE_RAM_BYTES,
};
use xheep_tile::{regs, WORD_BYTES};

use crate::backend::{BackendType, TileBackend};
use crate::buffer::DmaBuffer;
use crate::descriptor::{Phase, TransferDescriptor};
use crate::error::{Result, XheepError};
use crate::results::ResultBlock;

/// Number of 32-bit registers modelled (socket block plus user block)
const REG_WORDS: usize = regs::BOOT_EXIT_LOOP / WORD_BYTES + 1;

/// Firmware stand-in run when the boot loop is released
pub trait TileProgram: Debug + Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Execute against the fetched tile RAM and the host output window
    ///
    /// # Errors
    ///
    /// Returns an error if the program stores outside the window.
    fn run(&mut self, ram: &[u8], window: &mut TileWindow<'_>) -> Result<()>;
}

/// Host output buffer as the tile sees it over AXI
///
/// Only aligned 32-bit stores are supported.
#[derive(Debug)]
pub struct TileWindow<'a> {
    bytes: &'a mut [u8],
}

impl<'a> TileWindow<'a> {
    /// Window over `bytes`
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Store one little-endian word at byte `offset`
    ///
    /// # Errors
    ///
    /// Returns `TransferFailed` for unaligned stores or stores past the end
    /// of the host buffer.
    pub fn store_word(&mut self, offset: usize, value: u32) -> Result<()> {
        if offset % WORD_BYTES != 0 {
            return Err(XheepError::transfer_failed(
                Phase::BootExecute,
                format!("unaligned AXI store at {offset:#x}"),
            ));
        }
        let len = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(offset..offset + WORD_BYTES)
            .ok_or_else(|| {
                XheepError::transfer_failed(
                    Phase::BootExecute,
                    format!("AXI store at {offset:#x} outside {len} byte output buffer"),
                )
            })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Window length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the window has no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Writes a greeting into the shared message region
///
/// The string is stored NUL terminated, one word at a time, with the last
/// word zero padded.
#[derive(Debug, Clone)]
pub struct HelloProgram {
    message: String,
}

impl HelloProgram {
    /// Greeting the stock hello firmware writes
    pub const DEFAULT_MESSAGE: &'static str = "Hello from X-Heep Native tile!\n";

    /// Program writing `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for HelloProgram {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MESSAGE)
    }
}

impl TileProgram for HelloProgram {
    fn name(&self) -> &str {
        "hello"
    }

    fn run(&mut self, _ram: &[u8], window: &mut TileWindow<'_>) -> Result<()> {
        let mut bytes = self.message.as_bytes().to_vec();
        bytes.push(0);
        if bytes.len() > SHARED_STR_MAX {
            return Err(XheepError::transfer_failed(
                Phase::BootExecute,
                format!(
                    "{} byte message exceeds {SHARED_STR_MAX} byte shared region",
                    bytes.len()
                ),
            ));
        }

        for (i, chunk) in bytes.chunks(WORD_BYTES).enumerate() {
            let mut word = [0u8; WORD_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            window.store_word(SHARED_STR_OFFSET + i * WORD_BYTES, u32::from_le_bytes(word))?;
        }
        Ok(())
    }
}

/// Writes a canned result block, standing in for the seizure-detection CNN
#[derive(Debug, Clone, Copy, Default)]
pub struct SeizureCnnProgram {
    block: ResultBlock,
}

impl SeizureCnnProgram {
    /// Program reporting `block`
    #[must_use]
    pub const fn new(block: ResultBlock) -> Self {
        Self { block }
    }
}

impl TileProgram for SeizureCnnProgram {
    fn name(&self) -> &str {
        "seizure-cnn"
    }

    fn run(&mut self, _ram: &[u8], window: &mut TileWindow<'_>) -> Result<()> {
        for (i, word) in self.block.words().into_iter().enumerate() {
            window.store_word(SHARED_RES_OFFSET + i * WORD_BYTES, word)?;
        }
        Ok(())
    }
}

/// Where the simulated tile is in its boot sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileState {
    /// Spinning in the boot ROM with no code fetched
    Reset,
    /// Code in RAM, still spinning
    Loaded,
    /// Boot loop released, program has run
    Exited,
}

/// Software tile backend
#[derive(Debug)]
pub struct SoftwareBackend {
    ram: Vec<u8>,
    regs: [u32; REG_WORDS],
    state: TileState,
    program: Box<dyn TileProgram>,
    fail_on: HashSet<Phase>,
    issued: Vec<Phase>,
}

impl SoftwareBackend {
    /// Tile in reset that runs `program` on boot
    #[must_use]
    pub fn new(program: Box<dyn TileProgram>) -> Self {
        info!(
            "Software tile: {} KiB RAM, program '{}'",
            TILE_RAM_BYTES / 1024,
            program.name()
        );
        Self {
            ram: vec![0u8; TILE_RAM_BYTES],
            regs: [0; REG_WORDS],
            state: TileState::Reset,
            program,
            fail_on: HashSet::new(),
            issued: Vec::new(),
        }
    }

    /// Make every transfer of `phase` fail
    #[must_use]
    pub fn fail_on(mut self, phase: Phase) -> Self {
        self.fail_on.insert(phase);
        self
    }

    /// Phases issued so far, in order (including failed ones)
    #[must_use]
    pub fn issued(&self) -> &[Phase] {
        &self.issued
    }

    /// Tile RAM contents
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Value of the register at byte `offset`
    #[must_use]
    pub fn register(&self, offset: usize) -> Option<u32> {
        self.regs.get(offset / WORD_BYTES).copied()
    }

    fn write_reg(&mut self, offset: usize, value: u32) {
        self.regs[offset / WORD_BYTES] = value;
    }

    /// Program the socket the way the ESP driver does before starting it
    fn prep_xfer(&mut self, descriptor: &TransferDescriptor) {
        let boot = *descriptor.boot();
        self.write_reg(regs::BOOT_EXIT_LOOP, boot.exit_loop);
        self.write_reg(regs::BOOT_FETCH_CODE, boot.fetch_code);
        self.write_reg(regs::BOOT_FETCH_CODE_ADDR, boot.fetch_code_addr);
        self.write_reg(regs::CODE_SIZE_WORDS, boot.code_size_words);
        self.write_reg(regs::SRC_OFFSET, descriptor.src_offset());
        self.write_reg(regs::DST_OFFSET, descriptor.dst_offset());
        self.write_reg(regs::COHERENCE, descriptor.coherence().raw());
        self.write_reg(regs::CMD, u32::from(descriptor.run()));
    }

    fn fetch_code(&mut self, source: &[u8]) -> Result<()> {
        let words = self.regs[regs::CODE_SIZE_WORDS / WORD_BYTES] as usize;
        let addr = self.regs[regs::BOOT_FETCH_CODE_ADDR / WORD_BYTES] as usize;
        let bytes = words * WORD_BYTES;

        if bytes > source.len() {
            return Err(XheepError::transfer_failed(
                Phase::CodeFetch,
                format!("{words} words requested from {} byte buffer", source.len()),
            ));
        }
        let dest = self.ram.get_mut(addr..addr + bytes).ok_or_else(|| {
            XheepError::transfer_failed(
                Phase::CodeFetch,
                format!("{bytes} bytes at {addr:#x} exceed tile RAM"),
            )
        })?;
        dest.copy_from_slice(&source[..bytes]);

        if addr + bytes <= FW_ENTRY_POINT as usize {
            warn!(
                "Fetched code ends at {:#x}, before entry point {FW_ENTRY_POINT:#x}",
                addr + bytes
            );
        }
        debug!("Software tile: fetched {words} words to {addr:#x}");
        self.state = TileState::Loaded;
        Ok(())
    }

    fn exit_loop(&mut self, output: &mut [u8]) -> Result<()> {
        if self.state != TileState::Loaded {
            return Err(XheepError::invalid_state(format!(
                "boot loop released in {:?} state; no code fetched",
                self.state
            )));
        }

        let mut window = TileWindow::new(output);
        self.program.run(&self.ram, &mut window)?;
        self.state = TileState::Exited;
        debug!("Software tile: '{}' finished", self.program.name());
        Ok(())
    }
}

impl TileBackend for SoftwareBackend {
    fn transfer(
        &mut self,
        descriptor: TransferDescriptor,
        buffer: &mut dyn DmaBuffer,
    ) -> Result<()> {
        let phase = descriptor.phase();
        descriptor.trace(buffer.khandle());
        self.issued.push(phase);

        if self.fail_on.contains(&phase) {
            return Err(XheepError::transfer_failed(phase, "injected failure"));
        }

        self.prep_xfer(&descriptor);

        if descriptor.boot().fetch_code != 0 {
            self.fetch_code(buffer.as_slice())?;
        }
        if descriptor.boot().exit_loop != 0 {
            self.exit_loop(buffer.as_mut_slice())?;
        }
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn describe(&self) -> String {
        format!(
            "software tile ({} KiB RAM) running '{}'",
            TILE_RAM_BYTES / 1024,
            self.program.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferAllocator, HeapAllocator};
    use crate::results::SharedMessage;

    #[test]
    fn fetch_copies_into_ram_and_programs_registers() {
        let mut alloc = HeapAllocator::new();
        let mut fw = alloc.alloc(0x200).unwrap();
        fw.as_mut_slice()[0x180..0x184].copy_from_slice(&[0x13, 0, 0, 0]);

        let mut tile = SoftwareBackend::new(Box::new(HelloProgram::default()));
        tile.transfer(TransferDescriptor::code_fetch(fw.len()), fw.as_mut())
            .unwrap();

        assert_eq!(&tile.ram()[0x180..0x184], &[0x13, 0, 0, 0]);
        assert_eq!(tile.register(regs::CODE_SIZE_WORDS), Some(0x80));
        assert_eq!(tile.register(regs::BOOT_FETCH_CODE), Some(1));
        assert_eq!(tile.register(regs::BOOT_EXIT_LOOP), Some(0));
        assert_eq!(tile.register(regs::COHERENCE), Some(0));
    }

    #[test]
    fn boot_without_fetch_is_invalid_state() {
        let mut out = HeapAllocator::new().alloc(0xFA80).unwrap();
        let mut tile = SoftwareBackend::new(Box::new(HelloProgram::default()));
        let err = tile
            .transfer(TransferDescriptor::boot_execute(), out.as_mut())
            .unwrap_err();
        assert!(matches!(err, XheepError::InvalidState { .. }));
    }

    #[test]
    fn hello_writes_padded_words() {
        let mut alloc = HeapAllocator::new();
        let mut fw = alloc.alloc(0x190).unwrap();
        let mut out = alloc.alloc(0xFA80).unwrap();

        let mut tile = SoftwareBackend::new(Box::new(HelloProgram::new("abcde")));
        tile.transfer(TransferDescriptor::code_fetch(fw.len()), fw.as_mut())
            .unwrap();
        tile.transfer(TransferDescriptor::boot_execute(), out.as_mut())
            .unwrap();

        let region = &out.as_slice()[SHARED_STR_OFFSET..SHARED_STR_OFFSET + 12];
        assert_eq!(region, b"abcde\0\0\0\0\0\0\0");
        assert_eq!(SharedMessage::read_from(out.as_slice()).unwrap().text(), "abcde");
        assert_eq!(tile.issued(), &[Phase::CodeFetch, Phase::BootExecute]);
    }

    #[test]
    fn store_outside_window_fails() {
        let mut bytes = [0u8; 8];
        let mut window = TileWindow::new(&mut bytes);
        assert!(window.store_word(4, 1).is_ok());
        assert!(window.store_word(8, 1).is_err());
        assert!(window.store_word(2, 1).is_err());
    }

    #[test]
    fn oversized_fetch_rejected() {
        let mut fw = HeapAllocator::new().alloc(8).unwrap();
        let mut tile = SoftwareBackend::new(Box::new(HelloProgram::default()));
        let err = tile
            .transfer(TransferDescriptor::code_fetch(TILE_RAM_BYTES + 8), fw.as_mut())
            .unwrap_err();
        assert!(matches!(
            err,
            XheepError::TransferFailed {
                phase: Phase::CodeFetch,
                ..
            }
        ));
    }

    #[test]
    fn injected_failure_is_recorded() {
        let mut fw = HeapAllocator::new().alloc(8).unwrap();
        let mut tile =
            SoftwareBackend::new(Box::new(HelloProgram::default())).fail_on(Phase::CodeFetch);
        assert!(tile
            .transfer(TransferDescriptor::code_fetch(8), fw.as_mut())
            .is_err());
        assert_eq!(tile.issued(), &[Phase::CodeFetch]);
        assert!(tile.ram().iter().all(|&b| b == 0));
    }
}
