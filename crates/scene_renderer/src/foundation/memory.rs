//! Aligned memory layouts for GPU uploads
//!
//! Dynamic uniform buffers address records by `stride * index`, where the
//! stride is the record size rounded up to the device's
//! `minUniformBufferOffsetAlignment`. [`AlignedArena`] keeps that layout on
//! the CPU side as a typed slice-with-stride so callers never cast raw
//! pointers.

use bytemuck::Pod;
use std::marker::PhantomData;
use thiserror::Error;

/// Round `size` up to the next multiple of `alignment`
///
/// An alignment of zero means "no constraint" and returns `size` unchanged.
pub const fn align_up(size: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// Index outside an arena's capacity
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("arena index {index} out of range (capacity {capacity})")]
pub struct ArenaIndexError {
    /// Requested record index
    pub index: usize,
    /// Number of records the arena holds
    pub capacity: usize,
}

/// Fixed-capacity array of `T` records laid out at an aligned stride
pub struct AlignedArena<T: Pod> {
    bytes: Vec<u8>,
    stride: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> AlignedArena<T> {
    /// Create a zeroed arena of `capacity` records aligned to `min_alignment`
    pub fn new(capacity: usize, min_alignment: usize) -> Self {
        let stride = align_up(std::mem::size_of::<T>(), min_alignment);
        Self {
            bytes: vec![0; stride * capacity],
            stride,
            capacity,
            _marker: PhantomData,
        }
    }

    /// Byte distance between consecutive records
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte offset of record `index`, used as the dynamic offset at bind time
    pub fn offset_of(&self, index: usize) -> Result<usize, ArenaIndexError> {
        self.check(index)?;
        Ok(self.stride * index)
    }

    /// Overwrite record `index`
    pub fn set(&mut self, index: usize, value: &T) -> Result<(), ArenaIndexError> {
        let offset = self.offset_of(index)?;
        let size = std::mem::size_of::<T>();
        self.bytes[offset..offset + size].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    /// Read back record `index`
    pub fn get(&self, index: usize) -> Result<T, ArenaIndexError> {
        let offset = self.offset_of(index)?;
        let size = std::mem::size_of::<T>();
        Ok(bytemuck::pod_read_unaligned(&self.bytes[offset..offset + size]))
    }

    /// The whole arena as it should be copied into the GPU buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, index: usize) -> Result<(), ArenaIndexError> {
        if index < self.capacity {
            Ok(())
        } else {
            Err(ArenaIndexError {
                index,
                capacity: self.capacity,
            })
        }
    }
}
