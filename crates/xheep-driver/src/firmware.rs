//! Firmware sections and image flattening
//!
//! A tile program arrives as an ordered table of sections, each an address
//! inside tile RAM plus a payload. Before the code-fetch transfer the table
//! is flattened into one contiguous, zero-filled buffer that the tile copies
//! verbatim into its memory starting at address 0.
//!
//! # Placement rules
//!
//! - The image size is `align_up_8(max(addr + len))` over all sections.
//! - Sections are written in table order. Overlaps resolve last-write-wins
//!   and are reported as advisory warnings.
//! - A section that does not fit the destination buffer is skipped with a
//!   warning. It never touches adjacent bytes.

use std::ops::Range;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use object::elf::{FileHeader32, EM_RISCV, PT_LOAD};
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;
use tracing::{debug, info, warn};
use xheep_tile::align::align_up_8;
use xheep_tile::memmap::FW_ENTRY_POINT;

use crate::error::{Result, XheepError};

/// One contiguous piece of tile memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Offset inside the flat tile memory image
    pub addr: u32,
    /// Payload (Bytes enables zero-copy cloning of large sections)
    pub data: Bytes,
}

impl Section {
    /// Create a section at `addr`
    pub fn new(addr: u32, data: impl Into<Bytes>) -> Self {
        Self {
            addr,
            data: data.into(),
        }
    }

    /// Payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the section carries no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First byte past the section, `None` on address overflow
    #[must_use]
    pub fn end(&self) -> Option<usize> {
        (self.addr as usize).checked_add(self.data.len())
    }

    fn range(&self) -> Option<Range<usize>> {
        self.end().map(|end| self.addr as usize..end)
    }
}

/// Advisory findings from flattening; never counted as errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyWarning {
    /// Section skipped because it does not fit the destination
    OutOfBounds {
        /// Position in the section table
        index: usize,
        /// Section base address
        addr: u32,
        /// Section size in bytes
        size: usize,
        /// Destination size in bytes
        buffer_size: usize,
    },
    /// Two sections cover at least one common byte; the later one wins
    Overlap {
        /// Earlier section in table order
        earlier: usize,
        /// Later section in table order (its bytes are kept)
        later: usize,
    },
}

impl std::fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBounds {
                index,
                addr,
                size,
                buffer_size,
            } => write!(
                f,
                "section {index} (addr {addr:#x} size {size}) exceeds buffer (size {buffer_size})"
            ),
            Self::Overlap { earlier, later } => {
                write!(f, "section {later} overlaps section {earlier}; section {later} wins")
            }
        }
    }
}

/// Buffer size needed to hold every section, aligned to 8 bytes
///
/// # Errors
///
/// Returns [`XheepError::EmptyFirmware`] for an empty table and
/// [`XheepError::InvalidSection`] if a section end overflows.
pub fn required_size(sections: &[Section]) -> Result<usize> {
    if sections.is_empty() {
        return Err(XheepError::EmptyFirmware);
    }

    let mut end_max = 0usize;
    for (index, section) in sections.iter().enumerate() {
        let end = section
            .end()
            .ok_or_else(|| XheepError::invalid_section(index, "address + size overflows"))?;
        debug!(
            "Section {index}: addr={:#010x}, size={}, end={end:#010x}",
            section.addr,
            section.len()
        );
        end_max = end_max.max(end);
    }

    align_up_8(end_max).ok_or_else(|| {
        XheepError::invalid_section(sections.len() - 1, "image size overflows when aligned")
    })
}

/// Zero `buffer` and copy every fitting section into it, in table order
///
/// Returns the advisory warnings raised while placing sections.
pub fn flatten_into(sections: &[Section], buffer: &mut [u8]) -> Vec<AssemblyWarning> {
    debug!(
        "Loading {} firmware sections into {} byte buffer",
        sections.len(),
        buffer.len()
    );

    buffer.fill(0);
    let mut warnings = Vec::new();
    let mut placed: Vec<(usize, Range<usize>)> = Vec::with_capacity(sections.len());

    for (index, section) in sections.iter().enumerate() {
        let range = match section.range() {
            Some(r) if r.end <= buffer.len() => r,
            _ => {
                let warning = AssemblyWarning::OutOfBounds {
                    index,
                    addr: section.addr,
                    size: section.len(),
                    buffer_size: buffer.len(),
                };
                warn!("{warning}");
                warnings.push(warning);
                continue;
            }
        };

        for (earlier, prior) in &placed {
            let shared = prior.start < range.end && range.start < prior.end;
            if shared && !range.is_empty() && !prior.is_empty() {
                let warning = AssemblyWarning::Overlap {
                    earlier: *earlier,
                    later: index,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }

        buffer[range.clone()].copy_from_slice(&section.data);
        debug!(
            "  Section {index}: addr={:#010x}, size={} bytes",
            section.addr,
            section.len()
        );
        placed.push((index, range));
    }

    warnings
}

/// Flattened tile memory image
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
    warnings: Vec<AssemblyWarning>,
}

impl FirmwareImage {
    /// Size and flatten a section table
    ///
    /// # Errors
    ///
    /// Returns an error if the table is empty or a section overflows the
    /// address space.
    pub fn assemble(sections: &[Section]) -> Result<Self> {
        let size = required_size(sections)?;
        let mut bytes = vec![0u8; size];
        let warnings = flatten_into(sections, &mut bytes);

        info!(
            "Firmware image: {} sections, {size} bytes ({} words), {} warnings",
            sections.len(),
            size / xheep_tile::WORD_BYTES,
            warnings.len()
        );

        Ok(Self { bytes, warnings })
    }

    /// Image bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Image size in bytes (multiple of 8)
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the image is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Advisory warnings raised during flattening
    #[must_use]
    pub fn warnings(&self) -> &[AssemblyWarning] {
        &self.warnings
    }
}

/// Where a section table comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    /// RV32 ELF executable; every loadable segment becomes a section
    Elf(PathBuf),
    /// Flat binary placed at a single tile address
    Raw {
        /// Path to the binary
        path: PathBuf,
        /// Tile address of the first byte
        addr: u32,
    },
}

impl FirmwareSource {
    /// Path of the underlying file
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Elf(path) | Self::Raw { path, .. } => path,
        }
    }
}

/// Read a section table from disk
///
/// `load_base` is subtracted from ELF physical addresses to turn them into
/// offsets inside the tile memory image.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(source: &FirmwareSource, load_base: u32) -> Result<Vec<Section>> {
    let data = std::fs::read(source.path())?;
    info!("Read {} bytes from {}", data.len(), source.path().display());

    match source {
        FirmwareSource::Elf(_) => sections_from_elf(&data, load_base),
        FirmwareSource::Raw { addr, .. } => {
            if data.is_empty() {
                return Err(XheepError::EmptyFirmware);
            }
            Ok(vec![Section::new(*addr, data)])
        }
    }
}

/// Extract loadable segments of an RV32 ELF image
///
/// # Errors
///
/// Returns an error if the data is not a 32-bit ELF file, a segment lies
/// below `load_base`, or no segment carries file data.
pub fn sections_from_elf(data: &[u8], load_base: u32) -> Result<Vec<Section>> {
    let header = FileHeader32::<Endianness>::parse(data)
        .map_err(|e| XheepError::firmware(format!("not an ELF32 file: {e}")))?;
    let endian = header
        .endian()
        .map_err(|e| XheepError::firmware(format!("bad ELF endianness: {e}")))?;

    if header.e_machine(endian) != EM_RISCV {
        warn!(
            "ELF machine {} is not RISC-V; loading anyway",
            header.e_machine(endian)
        );
    }

    let entry = header.e_entry(endian).wrapping_sub(load_base);
    if entry != FW_ENTRY_POINT {
        warn!("ELF entry {entry:#x} differs from boot address {FW_ENTRY_POINT:#x}; the boot ROM jumps to {FW_ENTRY_POINT:#x}");
    }

    let program_headers = header
        .program_headers(endian, data)
        .map_err(|e| XheepError::firmware(format!("bad program headers: {e}")))?;

    let mut sections = Vec::new();
    for (index, ph) in program_headers.iter().enumerate() {
        if ph.p_type(endian) != PT_LOAD {
            continue;
        }
        let bytes = ph
            .data(endian, data)
            .map_err(|()| XheepError::firmware(format!("segment {index} data out of file")))?;
        if bytes.is_empty() {
            continue;
        }

        let paddr = ph.p_paddr(endian);
        let addr = paddr.checked_sub(load_base).ok_or_else(|| {
            XheepError::invalid_section(
                sections.len(),
                format!("segment {index} at {paddr:#x} lies below load base {load_base:#x}"),
            )
        })?;

        debug!("ELF segment {index}: paddr={paddr:#010x} -> addr={addr:#010x}, {} bytes", bytes.len());
        sections.push(Section::new(addr, Bytes::copy_from_slice(bytes)));
    }

    if sections.is_empty() {
        return Err(XheepError::EmptyFirmware);
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_aligned_max_end() {
        let sections = vec![
            Section::new(0x180, vec![1u8; 10]),
            Section::new(0x0, vec![2u8; 4]),
        ];
        assert_eq!(required_size(&sections).unwrap(), 0x190);
    }

    #[test]
    fn empty_table_rejected() {
        assert!(matches!(required_size(&[]), Err(XheepError::EmptyFirmware)));
        assert!(matches!(
            FirmwareImage::assemble(&[]),
            Err(XheepError::EmptyFirmware)
        ));
    }

    #[test]
    fn gaps_are_zero() {
        let sections = vec![
            Section::new(0, vec![0xAA; 4]),
            Section::new(12, vec![0xBB; 2]),
        ];
        let image = FirmwareImage::assemble(&sections).unwrap();
        assert_eq!(image.len(), 16);
        assert_eq!(&image.as_bytes()[..4], &[0xAA; 4]);
        assert!(image.as_bytes()[4..12].iter().all(|&b| b == 0));
        assert_eq!(&image.as_bytes()[12..14], &[0xBB; 2]);
        assert_eq!(&image.as_bytes()[14..], &[0, 0]);
        assert!(image.warnings().is_empty());
    }

    #[test]
    fn out_of_bounds_section_skipped() {
        let sections = vec![
            Section::new(0, vec![0x11; 8]),
            Section::new(6, vec![0x22; 4]),
        ];
        let mut buffer = vec![0xFF; 8];
        let warnings = flatten_into(&sections, &mut buffer);

        assert_eq!(buffer, vec![0x11; 8]);
        assert_eq!(
            warnings,
            vec![AssemblyWarning::OutOfBounds {
                index: 1,
                addr: 6,
                size: 4,
                buffer_size: 8
            }]
        );
    }

    #[test]
    fn overlap_last_write_wins_and_is_flagged() {
        let sections = vec![
            Section::new(0, vec![0x01; 4]),
            Section::new(2, vec![0x02; 4]),
        ];
        let image = FirmwareImage::assemble(&sections).unwrap();
        assert_eq!(&image.as_bytes()[..6], &[1, 1, 2, 2, 2, 2]);
        assert_eq!(
            image.warnings(),
            &[AssemblyWarning::Overlap {
                earlier: 0,
                later: 1
            }]
        );
    }

    #[test]
    fn section_at_top_of_address_space_skipped() {
        let sections = vec![Section::new(u32::MAX, vec![0x33; 16])];
        let mut buffer = vec![0u8; 64];
        let warnings = flatten_into(&sections, &mut buffer);
        assert!(buffer.iter().all(|&b| b == 0));
        assert!(matches!(
            warnings.as_slice(),
            [AssemblyWarning::OutOfBounds { index: 0, .. }]
        ));
    }

    #[test]
    fn non_elf_rejected() {
        let err = sections_from_elf(b"definitely not an elf file", 0).unwrap_err();
        assert!(matches!(err, XheepError::Firmware { .. }));
    }

    #[test]
    fn raw_source_loads_single_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

        let sections = load(
            &FirmwareSource::Raw {
                path,
                addr: 0x180,
            },
            0,
        )
        .unwrap();
        assert_eq!(sections, vec![Section::new(0x180, vec![1u8, 2, 3, 4, 5])]);
    }
}
