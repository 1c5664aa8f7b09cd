// Licensed under the Apache-2.0 license.

//! Hardware interface between the DMA drivers and the platform.
//!
//! A driver never touches memory-mapped I/O, interrupts or physical memory
//! directly. It is handed implementations of the traits below, which lets the
//! same driver run against real hardware (see the `uio` module) or against
//! the emulated peripherals used in tests.

use std::io;

use crate::buffer::{CachePolicy, PhysicalBuffer};
use crate::error::DmaError;

/// Word-wide access to a device register window.
///
/// Memory-mapped register access cannot fail, so neither method returns an
/// error. `offset` is a byte offset from the start of the window.
pub trait RegisterBus: Send + Sync {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
}

/// A blocking wait bound to a single interrupt line.
///
/// `wait` returns once per raised interrupt. After it returns the line stays
/// masked until `acknowledge` is called, which must happen after the driver
/// cleared the interrupt source in the device; otherwise the still-asserted
/// line immediately produces another notification.
pub trait Completion: Send + Sync {
    fn wait(&self) -> io::Result<()>;
    fn acknowledge(&self) -> io::Result<()>;
}

/// Backing storage of a physically contiguous memory region.
pub trait DmaRegion: Send + Sync {
    /// Physical address of the first byte, as seen by the DMA engine.
    fn phys_addr(&self) -> u64;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `data` into the region at `offset`. Callers guarantee bounds.
    fn write(&self, offset: usize, data: &[u8]);

    /// Copy bytes at `offset` into `data`. Callers guarantee bounds.
    fn read(&self, offset: usize, data: &mut [u8]);
}

/// Source of physically contiguous memory. Dropping the returned buffer
/// releases the memory.
pub trait DmaAllocator {
    fn alloc(&self, size: usize, cache: CachePolicy) -> Result<PhysicalBuffer, DmaError>;
}

/// Hardware-accelerated memory copy, as offered to the session layer.
pub trait MemCopy {
    /// `true` if the device answered the startup probe.
    fn is_supported(&self) -> bool;

    /// Copy `size` bytes from physical address `src` to physical address `dst`.
    ///
    /// A failure part way through a chunked copy leaves the chunks before the
    /// failing one already copied.
    fn copy(&self, dst: u64, src: u64, size: usize) -> Result<(), DmaError>;
}

/// Hardware capability-map parsing.
pub trait CapParser {
    fn is_supported(&self) -> bool;

    /// Parse the capability map at `src` and write the valid entries to `dst`.
    /// Returns the number of entries written.
    fn parse(&self, dst: u64, src: u64) -> Result<usize, DmaError>;
}
