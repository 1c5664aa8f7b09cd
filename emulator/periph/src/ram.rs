// Licensed under the Apache-2.0 license

//! Simulated physical memory shared by the CPU side and the emulated DMA
//! engines.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dma_driver::{CachePolicy, DmaAllocator, DmaError, DmaRegion, PhysicalBuffer};

const ALLOC_ALIGNMENT: usize = 64;

/// Outcome of a bus access by an emulated engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaOpError {
    ReadError,
    WriteError,
}

struct RamInner {
    base: u64,
    data: Mutex<Vec<u8>>,
    next_free: Mutex<usize>,
    live: AtomicUsize,
}

/// A window of physical memory at `base`. Clones share the same memory.
#[derive(Clone)]
pub struct Ram {
    inner: Arc<RamInner>,
}

impl Ram {
    pub fn new(base: u64, size: usize) -> Self {
        Ram {
            inner: Arc::new(RamInner {
                base,
                data: Mutex::new(vec![0; size]),
                next_free: Mutex::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn base(&self) -> u64 {
        self.inner.base
    }

    pub fn size(&self) -> usize {
        self.data().len()
    }

    /// `true` if `[addr, addr + len)` lies inside the window.
    pub fn contains(&self, addr: u64, len: usize) -> bool {
        self.offset(addr, len).is_some()
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), DmaOpError> {
        let offset = self.offset(addr, buf.len()).ok_or(DmaOpError::ReadError)?;
        buf.copy_from_slice(&self.data()[offset..offset + buf.len()]);
        Ok(())
    }

    pub fn write(&self, addr: u64, buf: &[u8]) -> Result<(), DmaOpError> {
        let offset = self.offset(addr, buf.len()).ok_or(DmaOpError::WriteError)?;
        self.data()[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    /// Copy between two ranges of the window, as a memory-to-memory engine does.
    pub fn copy(&self, dst: u64, src: u64, len: usize) -> Result<(), DmaOpError> {
        let src = self.offset(src, len).ok_or(DmaOpError::ReadError)?;
        let dst = self.offset(dst, len).ok_or(DmaOpError::WriteError)?;
        self.data().copy_within(src..src + len, dst);
        Ok(())
    }

    /// Buffers handed out and not yet dropped.
    pub fn live_allocations(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    fn offset(&self, addr: u64, len: usize) -> Option<usize> {
        let offset = usize::try_from(addr.checked_sub(self.inner.base)?).ok()?;
        let end = offset.checked_add(len)?;
        (end <= self.size()).then_some(offset)
    }

    fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DmaAllocator for Ram {
    fn alloc(&self, size: usize, _cache: CachePolicy) -> Result<PhysicalBuffer, DmaError> {
        let mut next_free = self
            .inner
            .next_free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let offset = next_free.next_multiple_of(ALLOC_ALIGNMENT);
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= self.size())
            .ok_or(DmaError::Io(io::ErrorKind::OutOfMemory))?;
        *next_free = end;
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        Ok(PhysicalBuffer::new(Box::new(RamRegion {
            ram: self.clone(),
            addr: self.inner.base + offset as u64,
            len: size,
        })))
    }
}

struct RamRegion {
    ram: Ram,
    addr: u64,
    len: usize,
}

impl DmaRegion for RamRegion {
    fn phys_addr(&self) -> u64 {
        self.addr
    }

    fn len(&self) -> usize {
        self.len
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let offset = self.addr + offset as u64;
        let _ = self.ram.write(offset, data);
    }

    fn read(&self, offset: usize, data: &mut [u8]) {
        let offset = self.addr + offset as u64;
        let _ = self.ram.read(offset, data);
    }
}

impl Drop for RamRegion {
    fn drop(&mut self) {
        self.ram.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}
