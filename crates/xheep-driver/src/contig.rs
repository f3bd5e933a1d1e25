//! ESP contiguous allocator
//!
//! The accelerator socket can only DMA from memory the `contig_alloc` driver
//! hands out. Each allocation opens the allocator node, asks for a region with
//! `CONTIG_IOC_ALLOC`, and maps it into the process. The kernel handle it
//! returns is what goes into the access descriptor.
//!
//! Release order on drop: `munmap`, `CONTIG_IOC_FREE`, close.

// ioctl and mmap APIs require exact integer and pointer types
#![allow(clippy::cast_possible_truncation)]

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, AsRawFd};
use std::path::{Path, PathBuf};

use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use tracing::{debug, warn};

use crate::abi::{ioctls, ContigAllocParams};
use crate::buffer::{BufferAllocator, DmaBuffer};
use crate::error::{Result, XheepError};

/// Allocator backed by `/dev/contig_alloc`
#[derive(Debug, Clone)]
pub struct ContigAllocator {
    path: PathBuf,
}

impl ContigAllocator {
    /// Allocator using the device node at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Device node path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BufferAllocator for ContigAllocator {
    fn alloc(&mut self, size: usize) -> Result<Box<dyn DmaBuffer>> {
        if size == 0 {
            return Err(XheepError::allocation_failed(size, "zero-sized buffer"));
        }
        if !self.path.exists() {
            return Err(XheepError::allocation_failed(
                size,
                format!("{} not present", self.path.display()),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                XheepError::allocation_failed(size, format!("open {}: {e}", self.path.display()))
            })?;

        let mut params = ContigAllocParams::preferred(size);

        // SAFETY: CONTIG_IOC_ALLOC reads and writes a ContigAllocParams.
        // Invariants: (1) fd open for the lifetime of `file`; (2) params is a
        // live, properly sized #[repr(C)] value; (3) request encodes its size.
        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                ioctls::CONTIG_IOC_ALLOC as _,
                &raw mut params,
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return Err(XheepError::allocation_failed(
                size,
                format!("CONTIG_IOC_ALLOC: {err}"),
            ));
        }

        // SAFETY: maps the allocation just reserved on this fd. Invariants:
        // (1) fd valid; (2) size matches the request; (3) result is either a
        // valid mapping of `size` bytes or an error.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
        };
        let ptr = match ptr {
            Ok(p) => p.cast::<u8>(),
            Err(e) => {
                free_khandle(&file, params.khandle);
                return Err(XheepError::allocation_failed(size, format!("mmap: {e}")));
            }
        };

        let mut buffer = ContigBuffer {
            file,
            ptr,
            size,
            khandle: params.khandle,
        };
        buffer.as_mut_slice().fill(0);

        debug!(
            "Contig buffer {:#x}: {size} bytes at {ptr:p} ({} chunks)",
            params.khandle, params.n_chunks
        );
        Ok(Box::new(buffer))
    }
}

/// Mapped contiguous allocation
#[derive(Debug)]
pub struct ContigBuffer {
    file: File,
    ptr: *mut u8,
    size: usize,
    khandle: u64,
}

// SAFETY: ContigBuffer owns its mapping exclusively; moving it between
// threads does not invalidate a process-wide mapping.
unsafe impl Send for ContigBuffer {}

impl DmaBuffer for ContigBuffer {
    fn khandle(&self) -> u64 {
        self.khandle
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr from mmap, valid for size bytes while self lives;
        // &self excludes concurrent writes through this handle.
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr from mmap, valid for size bytes; &mut self is exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for ContigBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/size are exactly the mapping created in alloc(); no
        // slices outlive self.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.size) } {
            warn!("munmap of contig buffer {:#x} failed: {e}", self.khandle);
        }
        free_khandle(&self.file, self.khandle);
        debug!("Freed contig buffer {:#x}", self.khandle);
    }
}

fn free_khandle(file: &File, khandle: u64) {
    // SAFETY: CONTIG_IOC_FREE reads one u64 handle. fd valid while file lives.
    let ret = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            ioctls::CONTIG_IOC_FREE as _,
            &raw const khandle,
        )
    };
    if ret < 0 {
        warn!(
            "CONTIG_IOC_FREE({khandle:#x}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_node_is_allocation_failure() {
        let mut alloc = ContigAllocator::new("/nonexistent/contig_alloc");
        assert!(matches!(
            alloc.alloc(4096),
            Err(XheepError::AllocationFailed { size: 4096, .. })
        ));
    }
}
