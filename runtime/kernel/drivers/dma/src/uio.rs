// Licensed under the Apache-2.0 license

//! Linux UIO backend: registers, interrupts and reserved DMA memory exposed
//! through `/dev/uioN`.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use ::uio::UioDevice;
use log::{debug, info};

use crate::buffer::{CachePolicy, PhysicalBuffer};
use crate::error::DmaError;
use crate::hil::{Completion, DmaAllocator, DmaRegion, RegisterBus};

const DMA_ALIGNMENT: usize = 64;

fn uio_error<E: Debug>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{err:?}"))
}

/// Read a hexadecimal attribute of a UIO mapping from sysfs.
fn map_attribute(index: usize, mapping: usize, name: &str) -> io::Result<u64> {
    let path = format!("/sys/class/uio/uio{index}/maps/map{mapping}/{name}");
    let text = fs::read_to_string(&path)?;
    let text = text.trim();
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{path}: {err}")))
}

/// Memory mapping of the first region of a UIO device.
struct Mapping {
    _device: UioDevice,
    base: *mut u8,
    size: usize,
}

// SAFETY: the mapping stays valid for the lifetime of the device and all
// accesses through it are volatile word or byte copies.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn open(index: usize) -> io::Result<Mapping> {
        let device = UioDevice::blocking_new(index).map_err(uio_error)?;
        let base = device.map_mapping(0).map_err(uio_error)? as *mut u8;
        let size = map_attribute(index, 0, "size")? as usize;
        Ok(Mapping {
            _device: device,
            base,
            size,
        })
    }
}

/// Register window of a device, mapped from its UIO node.
pub struct UioRegisters {
    mapping: Mapping,
}

impl UioRegisters {
    pub fn open(index: usize) -> io::Result<UioRegisters> {
        let mapping = Mapping::open(index)?;
        debug!("uio{index}: {:#x} byte register window", mapping.size);
        Ok(UioRegisters { mapping })
    }

    fn word(&self, offset: usize) -> *mut u32 {
        assert!(offset % 4 == 0 && offset + 4 <= self.mapping.size);
        self.mapping.base.wrapping_add(offset) as *mut u32
    }
}

impl RegisterBus for UioRegisters {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `word` checks the offset against the mapped window.
        unsafe { self.word(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: `word` checks the offset against the mapped window.
        unsafe { self.word(offset).write_volatile(value) }
    }
}

/// Interrupt of a device, delivered through reads of its UIO node.
pub struct UioInterrupt {
    device: Mutex<UioDevice>,
}

impl UioInterrupt {
    pub fn open(index: usize) -> io::Result<UioInterrupt> {
        let device = UioDevice::blocking_new(index).map_err(uio_error)?;
        Ok(UioInterrupt {
            device: Mutex::new(device),
        })
    }
}

impl Completion for UioInterrupt {
    fn wait(&self) -> io::Result<()> {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        device.irq_wait().map_err(uio_error)?;
        Ok(())
    }

    fn acknowledge(&self) -> io::Result<()> {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        device.irq_enable().map_err(uio_error)
    }
}

struct ReservedMemory {
    mapping: Mapping,
    phys_addr: u64,
    next: Mutex<usize>,
}

/// Reserved physical memory exposed as a UIO mapping, handed out by a bump
/// allocator. Freed buffers are not reused.
#[derive(Clone)]
pub struct UioMemory {
    inner: Arc<ReservedMemory>,
}

impl UioMemory {
    pub fn open(index: usize) -> io::Result<UioMemory> {
        let mapping = Mapping::open(index)?;
        let phys_addr = map_attribute(index, 0, "addr")?;
        info!(
            "uio{index}: {:#x} bytes of DMA memory at {phys_addr:#x}",
            mapping.size
        );
        Ok(UioMemory {
            inner: Arc::new(ReservedMemory {
                mapping,
                phys_addr,
                next: Mutex::new(0),
            }),
        })
    }
}

impl DmaAllocator for UioMemory {
    fn alloc(&self, size: usize, cache: CachePolicy) -> Result<PhysicalBuffer, DmaError> {
        if cache != CachePolicy::Uncached {
            debug!("uio memory is always mapped uncached, ignoring {cache:?}");
        }
        let mut next = self.inner.next.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = next.next_multiple_of(DMA_ALIGNMENT);
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= self.inner.mapping.size)
            .ok_or(DmaError::Io(io::ErrorKind::OutOfMemory))?;
        *next = end;
        Ok(PhysicalBuffer::new(Box::new(UioRegion {
            memory: Arc::clone(&self.inner),
            offset,
            len: size,
        })))
    }
}

struct UioRegion {
    memory: Arc<ReservedMemory>,
    offset: usize,
    len: usize,
}

impl DmaRegion for UioRegion {
    fn phys_addr(&self) -> u64 {
        self.memory.phys_addr + self.offset as u64
    }

    fn len(&self) -> usize {
        self.len
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let base = self.memory.mapping.base.wrapping_add(self.offset + offset);
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: the allocator keeps the region inside the mapping and
            // `PhysicalBuffer` checks the access against the region.
            unsafe { base.add(i).write_volatile(*byte) };
        }
    }

    fn read(&self, offset: usize, data: &mut [u8]) {
        let base = self.memory.mapping.base.wrapping_add(self.offset + offset);
        for (i, byte) in data.iter_mut().enumerate() {
            // SAFETY: see `write`.
            *byte = unsafe { base.add(i).read_volatile() };
        }
    }
}
