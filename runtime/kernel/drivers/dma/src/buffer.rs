// Licensed under the Apache-2.0 license.

//! Physically contiguous buffers owned by a driver.

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes};

use crate::hil::DmaRegion;

/// Cache attribute requested for a buffer mapping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Required for memory the DMA engine reads or writes behind the CPU's back.
    #[default]
    Uncached,
    WriteCombined,
    Cached,
}

/// A physically contiguous region, e.g. descriptor storage or a parse
/// destination. The memory is released when the buffer is dropped.
pub struct PhysicalBuffer {
    region: Box<dyn DmaRegion>,
}

impl PhysicalBuffer {
    pub fn new(region: Box<dyn DmaRegion>) -> Self {
        PhysicalBuffer { region }
    }

    pub fn phys_addr(&self) -> u64 {
        self.region.phys_addr()
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Copy `data` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// The write must lie within the buffer.
    pub fn write(&self, offset: usize, data: &[u8]) {
        self.check_bounds(offset, data.len());
        self.region.write(offset, data);
    }

    /// Copy bytes at `offset` into `data`.
    ///
    /// # Panics
    ///
    /// The read must lie within the buffer.
    pub fn read(&self, offset: usize, data: &mut [u8]) {
        self.check_bounds(offset, data.len());
        self.region.read(offset, data);
    }

    /// Store a fixed-layout record at `offset`.
    pub fn write_obj<T: IntoBytes + Immutable>(&self, offset: usize, obj: &T) {
        self.write(offset, obj.as_bytes());
    }

    /// Load a fixed-layout record from `offset`.
    pub fn read_obj<T: FromBytes + IntoBytes>(&self, offset: usize) -> T {
        let mut obj = T::new_zeroed();
        self.read(offset, obj.as_mut_bytes());
        obj
    }

    fn check_bounds(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len()),
            "access {offset:#x}+{len:#x} outside buffer of {:#x} bytes",
            self.len()
        );
    }
}
