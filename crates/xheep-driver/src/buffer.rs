//! DMA buffers shared between host and tile
//!
//! A session holds exactly two buffers: the firmware source for the code
//! fetch and the output sink for boot-and-execute. Both are acquired up front
//! and released by `Drop`, so every exit path frees each buffer exactly once.

use std::fmt::Debug;

use tracing::debug;

use crate::error::{Result, XheepError};

/// Host memory the accelerator socket can reach
pub trait DmaBuffer: Debug + Send {
    /// Kernel handle passed in the access descriptor
    fn khandle(&self) -> u64;

    /// Read view of the buffer
    fn as_slice(&self) -> &[u8];

    /// Write view of the buffer
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Buffer size in bytes
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True if the buffer has no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of zero-filled DMA buffers
pub trait BufferAllocator: Debug {
    /// Allocate a zero-filled buffer of `size` bytes
    ///
    /// # Errors
    ///
    /// Returns [`XheepError::AllocationFailed`] if the memory cannot be
    /// obtained.
    fn alloc(&mut self, size: usize) -> Result<Box<dyn DmaBuffer>>;
}

/// Ordinary host memory with synthetic kernel handles
///
/// Used with the software tile backend, where no kernel resolves handles.
#[derive(Debug)]
pub struct HeapAllocator {
    next_handle: u64,
    limit: Option<usize>,
}

impl HeapAllocator {
    /// First handle given out; zero is kept as "no buffer"
    const FIRST_HANDLE: u64 = 0x1000;

    /// Unbounded heap allocator
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_handle: Self::FIRST_HANDLE,
            limit: None,
        }
    }

    /// Refuse any single allocation larger than `limit` bytes
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferAllocator for HeapAllocator {
    fn alloc(&mut self, size: usize) -> Result<Box<dyn DmaBuffer>> {
        if size == 0 {
            return Err(XheepError::allocation_failed(size, "zero-sized buffer"));
        }
        if let Some(limit) = self.limit {
            if size > limit {
                return Err(XheepError::allocation_failed(
                    size,
                    format!("exceeds limit of {limit} bytes"),
                ));
            }
        }

        let khandle = self.next_handle;
        self.next_handle += 1;
        debug!("Heap buffer {khandle:#x}: {size} bytes");

        Ok(Box::new(HeapBuffer {
            data: vec![0u8; size],
            khandle,
        }))
    }
}

/// Buffer returned by [`HeapAllocator`]
#[derive(Debug)]
pub struct HeapBuffer {
    data: Vec<u8>,
    khandle: u64,
}

impl DmaBuffer for HeapBuffer {
    fn khandle(&self) -> u64 {
        self.khandle
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        debug!("Freed heap buffer {:#x}", self.khandle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffers_are_zeroed_and_distinct() {
        let mut alloc = HeapAllocator::new();
        let a = alloc.alloc(64).unwrap();
        let b = alloc.alloc(32).unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(b.len(), 32);
        assert!(a.as_slice().iter().all(|&x| x == 0));
        assert_ne!(a.khandle(), b.khandle());
        assert_ne!(a.khandle(), 0);
    }

    #[test]
    fn limit_enforced() {
        let mut alloc = HeapAllocator::new().with_limit(16);
        assert!(alloc.alloc(16).is_ok());
        assert!(matches!(
            alloc.alloc(17),
            Err(XheepError::AllocationFailed { size: 17, .. })
        ));
    }

    #[test]
    fn zero_size_rejected() {
        assert!(HeapAllocator::new().alloc(0).is_err());
    }
}
