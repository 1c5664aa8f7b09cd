// Licensed under the Apache-2.0 license.

//! Scatter-gather transfer descriptors of the AXI CDMA.

use core::mem::size_of;

use dma_registers::axicdma::bits::{TdControl, TdStatus};
use log::debug;
use tock_registers::LocalRegisterCopy;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::buffer::PhysicalBuffer;
use crate::regs::{lower_32_bits, upper_32_bits};

/// Descriptor size and required alignment.
pub const TD_SIZE: usize = 64;
/// Maximum number of descriptors in one chain.
pub const MAX_TD_COUNT: usize = 512;
/// Size of the descriptor storage buffer.
pub const TD_DS_SIZE: usize = TD_SIZE * MAX_TD_COUNT;
/// Largest byte count a single descriptor or simple transfer can carry.
pub const MAX_BTT: u32 = 0x007f_ffff;

/// One transfer descriptor, laid out exactly as the engine reads it.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TransferDescriptor {
    pub next_desc: u32,
    pub next_desc_msb: u32,
    pub src_addr: u32,
    pub src_addr_msb: u32,
    pub dst_addr: u32,
    pub dst_addr_msb: u32,
    pub control: u32,
    pub status: u32,
    pub reserved: [u32; 8],
}

const _: () = assert!(size_of::<TransferDescriptor>() == TD_SIZE);

impl TransferDescriptor {
    pub fn next(&self) -> u64 {
        join(self.next_desc, self.next_desc_msb)
    }

    pub fn src(&self) -> u64 {
        join(self.src_addr, self.src_addr_msb)
    }

    pub fn dst(&self) -> u64 {
        join(self.dst_addr, self.dst_addr_msb)
    }

    pub fn bytes_to_transfer(&self) -> u32 {
        LocalRegisterCopy::<u32, TdControl::Register>::new(self.control).read(TdControl::Btt)
    }

    pub fn status(&self) -> LocalRegisterCopy<u32, TdStatus::Register> {
        LocalRegisterCopy::new(self.status)
    }
}

fn join(lsb: u32, msb: u32) -> u64 {
    (u64::from(msb) << 32) | u64::from(lsb)
}

/// A chain written into the descriptor storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    /// Descriptor the engine starts from: the last one written.
    pub head: u64,
    /// Descriptor the engine stops at: the storage base.
    pub tail: u64,
    pub count: usize,
}

/// Descriptor storage, reused by every scatter-gather transfer.
///
/// Chains are written from the storage base upwards and linked backwards:
/// every new descriptor points at the previously written one. The engine
/// therefore starts at the newest descriptor and stops at the storage base.
pub struct DescriptorRing {
    storage: PhysicalBuffer,
}

impl DescriptorRing {
    /// # Panics
    ///
    /// `storage` must hold [`MAX_TD_COUNT`] descriptors and be 64-byte aligned.
    pub fn new(storage: PhysicalBuffer) -> Self {
        assert!(storage.len() >= TD_DS_SIZE);
        assert_eq!(storage.phys_addr() % TD_SIZE as u64, 0);
        DescriptorRing { storage }
    }

    pub fn base(&self) -> u64 {
        self.storage.phys_addr()
    }

    /// Describe the copy of `total` bytes from `src` to `dst` as a chain of
    /// descriptors carrying at most `max_btt` bytes each.
    ///
    /// # Panics
    ///
    /// The copy must fit in [`MAX_TD_COUNT`] descriptors, and `total` and
    /// `max_btt` must be non-zero.
    pub fn build_chain(&self, dst: u64, src: u64, total: usize, max_btt: u32) -> Chain {
        assert!(total > 0 && max_btt > 0);
        let count = total.div_ceil(max_btt as usize);
        assert!(
            count <= MAX_TD_COUNT,
            "{total} bytes need {count} descriptors"
        );

        let base = self.base();
        // The first descriptor links to itself.
        let mut previous = base;
        let mut offset = 0u64;
        let mut remaining = total;
        for index in 0..count {
            let btt = remaining.min(max_btt as usize);
            let td = TransferDescriptor {
                next_desc: lower_32_bits(previous),
                next_desc_msb: upper_32_bits(previous),
                src_addr: lower_32_bits(src + offset),
                src_addr_msb: upper_32_bits(src + offset),
                dst_addr: lower_32_bits(dst + offset),
                dst_addr_msb: upper_32_bits(dst + offset),
                control: TdControl::Btt.val(btt as u32).value,
                ..Default::default()
            };
            self.storage.write_obj(index * TD_SIZE, &td);
            previous = base + (index * TD_SIZE) as u64;
            offset += btt as u64;
            remaining -= btt;
        }

        Chain {
            head: previous,
            tail: base,
            count,
        }
    }

    /// Read back descriptor `index` of the storage.
    pub fn descriptor(&self, index: usize) -> TransferDescriptor {
        self.storage.read_obj(index * TD_SIZE)
    }

    /// Read back the descriptor at physical address `addr`.
    pub fn descriptor_at(&self, addr: u64) -> Option<TransferDescriptor> {
        let offset = addr.checked_sub(self.base())?;
        if offset % TD_SIZE as u64 != 0 || offset as usize >= self.storage.len() {
            return None;
        }
        Some(self.descriptor(offset as usize / TD_SIZE))
    }

    pub fn dump_chain(&self, chain: &Chain) {
        let mut addr = chain.head;
        for _ in 0..chain.count {
            let Some(td) = self.descriptor_at(addr) else {
                debug!("descriptor {addr:#x} outside storage");
                return;
            };
            let status = td.status();
            debug!(
                "TD @ {addr:#x}: next={:#x} src={:#x} dst={:#x} btt={:#x} status={:#010x} \
                 cmplt={} dec_err={} slv_err={} int_err={}",
                td.next(),
                td.src(),
                td.dst(),
                td.bytes_to_transfer(),
                td.status,
                status.is_set(TdStatus::Cmplt),
                status.is_set(TdStatus::DmaDecErr),
                status.is_set(TdStatus::DmaSlvErr),
                status.is_set(TdStatus::DmaIntErr),
            );
            addr = td.next();
        }
    }
}
