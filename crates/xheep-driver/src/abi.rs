//! ESP kernel ABI mirrored in Rust
//!
//! These structs are passed by pointer to the `xheep_rtl` and `contig_alloc`
//! drivers, so their layout must match the C headers of the running ESP
//! kernel byte for byte. All padding is spelled out so the types can be
//! `bytemuck::Pod` and dumped or compared as plain bytes.
//!
//! ```text
//! XheepRtlAccess (320 bytes)
//!   0    EspAccess esp           (296 bytes)
//!   296  boot_exit_loop
//!   300  boot_fetch_code
//!   304  boot_fetch_code_addr
//!   308  code_size_words
//!   312  src_offset
//!   316  dst_offset
//! ```

// ioctl request numbers are built from struct sizes that are known to fit
#![allow(clippy::cast_possible_truncation)]

use bytemuck::{Pod, Zeroable};
use std::os::raw::c_ulong;

use crate::descriptor::TransferDescriptor;

/// ioctl request number encoding (Linux asm-generic layout)
pub mod ioctls {
    use super::{c_ulong, ContigAllocParams, XheepRtlAccess};

    const IOC_NRSHIFT: u32 = 0;
    const IOC_TYPESHIFT: u32 = 8;
    const IOC_SIZESHIFT: u32 = 16;
    const IOC_DIRSHIFT: u32 = 30;

    const IOC_WRITE: c_ulong = 1;
    const IOC_READ: c_ulong = 2;

    /// Helper mirroring `_IOC(dir, type, nr, size)`
    const fn ioc(dir: c_ulong, ty: u8, nr: u8, size: usize) -> c_ulong {
        (dir << IOC_DIRSHIFT)
            | ((size as c_ulong) << IOC_SIZESHIFT)
            | ((ty as c_ulong) << IOC_TYPESHIFT)
            | ((nr as c_ulong) << IOC_NRSHIFT)
    }

    /// `_IOW(type, nr, size)`
    pub const fn iow(ty: u8, nr: u8, size: usize) -> c_ulong {
        ioc(IOC_WRITE, ty, nr, size)
    }

    /// `_IOWR(type, nr, size)`
    pub const fn iowr(ty: u8, nr: u8, size: usize) -> c_ulong {
        ioc(IOC_READ | IOC_WRITE, ty, nr, size)
    }

    /// ESP accelerator ioctl magic
    pub const ESP_IOC_MAGIC: u8 = b'S';

    /// `XHEEP_RTL_IOC_ACCESS = _IOW('S', 0, struct xheep_rtl_access)`
    pub const XHEEP_RTL_IOC_ACCESS: c_ulong =
        iow(ESP_IOC_MAGIC, 0, std::mem::size_of::<XheepRtlAccess>());

    /// Contiguous allocator ioctl magic
    pub const CONTIG_IOC_MAGIC: u8 = b'C';

    /// `CONTIG_IOC_ALLOC = _IOWR('C', 0, struct contig_alloc_params)`
    pub const CONTIG_IOC_ALLOC: c_ulong =
        iowr(CONTIG_IOC_MAGIC, 0, std::mem::size_of::<ContigAllocParams>());

    /// `CONTIG_IOC_FREE = _IOW('C', 1, contig_khandle_t)`
    pub const CONTIG_IOC_FREE: c_ulong = iow(CONTIG_IOC_MAGIC, 1, std::mem::size_of::<u64>());
}

/// Generic part of every ESP accelerator access (`struct esp_access`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EspAccess {
    /// Kernel handle of the contiguous buffer bound to the access
    pub contig: u64,
    /// Start the accelerator
    pub run: u8,
    /// Point-to-point store enable
    pub p2p_store: u8,
    /// Number of point-to-point sources
    pub p2p_nsrcs: u8,
    /// Point-to-point source device names
    pub p2p_srcs: [[u8; 64]; 4],
    _pad0: u8,
    /// Coherence mode (`ACC_COH_*`)
    pub coherence: u32,
    /// Footprint hint for coherence selection
    pub footprint: u32,
    /// Allocation policy of the bound buffer
    pub alloc_policy: u32,
    /// DDR node of the bound buffer
    pub ddr_node: u32,
    /// In-place operation flag
    pub in_place: u32,
    /// Data reuse factor
    pub reuse_factor: u32,
    _pad1: u32,
}

/// X-HEEP accelerator access (`struct xheep_rtl_access`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct XheepRtlAccess {
    /// Generic ESP fields
    pub esp: EspAccess,
    /// Release the boot ROM loop
    pub boot_exit_loop: u32,
    /// Copy code into tile RAM
    pub boot_fetch_code: u32,
    /// Tile address of the fetched code
    pub boot_fetch_code_addr: u32,
    /// Words to fetch
    pub code_size_words: u32,
    /// Source byte offset
    pub src_offset: u32,
    /// Destination byte offset
    pub dst_offset: u32,
}

impl XheepRtlAccess {
    /// Lower a descriptor bound to the buffer with kernel handle `khandle`
    #[must_use]
    pub fn from_descriptor(desc: &TransferDescriptor, khandle: u64) -> Self {
        let mut access = Self::zeroed();
        access.esp.contig = khandle;
        access.esp.run = u8::from(desc.run());
        access.esp.coherence = desc.coherence().raw();

        let boot = desc.boot();
        access.boot_exit_loop = boot.exit_loop;
        access.boot_fetch_code = boot.fetch_code;
        access.boot_fetch_code_addr = boot.fetch_code_addr;
        access.code_size_words = boot.code_size_words;
        access.src_offset = desc.src_offset();
        access.dst_offset = desc.dst_offset();
        access
    }
}

/// Request for the ESP contiguous allocator (`struct contig_alloc_params`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ContigAllocParams {
    /// Allocation policy (0 = preferred node)
    pub policy: u32,
    /// Preferred DDR node
    pub pref_node: u32,
    /// Requested size in bytes
    pub size: u64,
    /// Number of chunks backing the allocation (out)
    pub n_chunks: u64,
    /// log2 of the chunk size (out)
    pub chunk_log: u32,
    _pad0: u32,
    /// Kernel handle of the allocation (out)
    pub khandle: u64,
}

impl ContigAllocParams {
    /// Preferred-node request for `size` bytes
    #[must_use]
    pub fn preferred(size: usize) -> Self {
        let mut params = Self::zeroed();
        params.size = size as u64;
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn esp_access_layout() {
        assert_eq!(offset_of!(EspAccess, run), 8);
        assert_eq!(offset_of!(EspAccess, p2p_srcs), 11);
        assert_eq!(offset_of!(EspAccess, coherence), 268);
        assert_eq!(offset_of!(EspAccess, reuse_factor), 288);
        assert_eq!(size_of::<EspAccess>(), 296);
    }

    #[test]
    fn xheep_access_layout() {
        assert_eq!(offset_of!(XheepRtlAccess, boot_exit_loop), 296);
        assert_eq!(offset_of!(XheepRtlAccess, code_size_words), 308);
        assert_eq!(offset_of!(XheepRtlAccess, dst_offset), 316);
        assert_eq!(size_of::<XheepRtlAccess>(), 320);
    }

    #[test]
    fn access_ioctl_number() {
        // _IOW('S', 0, 320): dir=1, size=0x140, type=0x53, nr=0
        assert_eq!(ioctls::XHEEP_RTL_IOC_ACCESS, 0x4140_5300);
    }

    #[test]
    fn lowering_code_fetch() {
        let desc = TransferDescriptor::code_fetch(64);
        let access = XheepRtlAccess::from_descriptor(&desc, 0xdead_0000);
        assert_eq!(access.esp.contig, 0xdead_0000);
        assert_eq!(access.esp.run, 1);
        assert_eq!(access.esp.coherence, 0);
        assert_eq!(access.esp.p2p_nsrcs, 0);
        assert_eq!(access.boot_fetch_code, 1);
        assert_eq!(access.boot_exit_loop, 0);
        assert_eq!(access.code_size_words, 16);
    }

    #[test]
    fn lowering_boot_execute() {
        let desc = TransferDescriptor::boot_execute();
        let access = XheepRtlAccess::from_descriptor(&desc, 7);
        assert_eq!(access.boot_fetch_code, 0);
        assert_eq!(access.boot_exit_loop, 1);
        assert_eq!(access.code_size_words, 0);
    }
}
