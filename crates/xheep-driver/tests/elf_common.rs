//! Minimal ELF writer for loader tests

#![allow(dead_code)]

use object::{
    elf,
    write::elf::{FileHeader, ProgramHeader, Writer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub paddr: u64,
    pub data: Vec<u8>,
    pub zero_padding: u64,
    pub load: bool,
}

impl Segment {
    pub fn load(paddr: u64, data: Vec<u8>) -> Self {
        Self {
            paddr,
            data,
            zero_padding: 0,
            load: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfCreateInfo {
    pub segments: Vec<Segment>,
    pub entry: u64,
    pub is_64: bool,
    pub machine: u16,
}

impl ElfCreateInfo {
    /// RV32 executable with the given segments
    pub fn riscv32(entry: u64, segments: Vec<Segment>) -> Self {
        Self {
            segments,
            entry,
            is_64: false,
            machine: elf::EM_RISCV,
        }
    }
}

pub fn create_elf_file(info: &ElfCreateInfo) -> Vec<u8> {
    let mut buffer = vec![];
    let mut writer = Writer::new(object::Endianness::Little, info.is_64, &mut buffer);
    writer.reserve_file_header();
    writer.reserve_program_headers(info.segments.len() as u32);

    let offsets: Vec<usize> = info
        .segments
        .iter()
        .map(|seg| {
            if seg.load && !seg.data.is_empty() {
                writer.reserve(seg.data.len(), 64)
            } else {
                0
            }
        })
        .collect();

    writer
        .write_file_header(&FileHeader {
            os_abi: elf::ELFOSABI_NONE,
            abi_version: 0,
            e_type: elf::ET_EXEC,
            e_machine: info.machine,
            e_entry: info.entry,
            e_flags: 0,
        })
        .unwrap();

    for (seg, offset) in info.segments.iter().zip(&offsets) {
        writer.write_program_header(&ProgramHeader {
            p_type: if seg.load { elf::PT_LOAD } else { elf::PT_NULL },
            p_flags: elf::PF_R | elf::PF_X,
            p_offset: *offset as u64,
            p_vaddr: seg.paddr,
            p_paddr: seg.paddr,
            p_filesz: if seg.load { seg.data.len() as u64 } else { 0 },
            p_memsz: seg.data.len() as u64 + seg.zero_padding,
            p_align: 64,
        });
    }

    for seg in &info.segments {
        if seg.load && !seg.data.is_empty() {
            writer.write_align(64);
            writer.write(&seg.data);
        }
    }

    assert_eq!(writer.reserved_len(), writer.len());
    buffer
}
