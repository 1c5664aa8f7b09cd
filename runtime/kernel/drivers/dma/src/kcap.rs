// Licensed under the Apache-2.0 license

// Driver for the capability parser: an AXI DMA streams a capability map out
// of memory (MM2S) into the parser, which streams the valid entries back
// (S2MM). An AXI GPIO block reports how many entries were valid.
// Reference: https://docs.amd.com/r/en-US/pg021_axi_dma

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use dma_registers::axidma::bits::{AxidmaControl, AxidmaLength};
use dma_registers::DmaStatus;
use log::{debug, error, info, warn};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::axicdma::{check_range, PROBE_ATTEMPTS, PROBE_INTERVAL};
use crate::buffer::{CachePolicy, PhysicalBuffer};
use crate::engine::{await_completion, TransferMode, TransferState};
use crate::error::DmaError;
use crate::hil::{CapParser, Completion, DmaAllocator, RegisterBus};
use crate::regs::{AxidmaChannel, Axigpio, MM2S, S2MM};

/// Number of entries in a capability map.
pub const MAX_CAP_INDEX: usize = 4096;
pub const CAP_INDEX_SIZE: usize = 16;
pub const PARSED_CAP_INDEX_SIZE: usize = 8;
/// Bytes streamed out of memory per parse.
pub const KCAP_MAP_SIZE: usize = MAX_CAP_INDEX * CAP_INDEX_SIZE;
pub const PARSED_BUFFER_SIZE: usize = MAX_CAP_INDEX * PARSED_CAP_INDEX_SIZE;

/// One entry of a capability map as it sits in memory.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CapIndex {
    pub badge: u32,
    /// Capability selector in the upper half, reference count in the lower.
    pub kcap_ref: u32,
    pub reserved: [u32; 2],
}

impl CapIndex {
    pub fn new(kcap: u16, badge: u32) -> Self {
        CapIndex {
            badge,
            kcap_ref: u32::from(kcap) << 16,
            ..Default::default()
        }
    }

    pub fn kcap(&self) -> u32 {
        self.kcap_ref >> 16
    }

    /// Entries with an empty selector are dropped by the parser.
    pub fn is_valid(&self) -> bool {
        self.kcap() != 0
    }
}

/// One entry produced by the parser.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ParsedCapIndex {
    pub kcap: u32,
    pub badge: u32,
}

const _: () = assert!(core::mem::size_of::<CapIndex>() == CAP_INDEX_SIZE);
const _: () = assert!(core::mem::size_of::<ParsedCapIndex>() == PARSED_CAP_INDEX_SIZE);

struct ParseState {
    buffer: PhysicalBuffer,
    mm2s: TransferState,
    s2mm: TransferState,
}

pub struct Kcap {
    dma: Arc<dyn RegisterBus>,
    gpio: Arc<dyn RegisterBus>,
    mm2s_irq: Arc<dyn Completion>,
    s2mm_irq: Arc<dyn Completion>,
    state: Mutex<ParseState>,
    supported: bool,
}

impl Kcap {
    pub fn new(
        dma: Arc<dyn RegisterBus>,
        gpio: Arc<dyn RegisterBus>,
        mm2s_irq: Arc<dyn Completion>,
        s2mm_irq: Arc<dyn Completion>,
        allocator: &dyn DmaAllocator,
    ) -> Result<Kcap, DmaError> {
        let buffer = allocator.alloc(PARSED_BUFFER_SIZE, CachePolicy::Uncached)?;
        mm2s_irq.acknowledge()?;
        s2mm_irq.acknowledge()?;

        // Reset on either channel resets the whole engine.
        let mm2s = AxidmaChannel::new(dma.as_ref(), &MM2S);
        mm2s.control().modify(AxidmaControl::Reset::SET);
        let supported = (0..PROBE_ATTEMPTS).any(|attempt| {
            if attempt > 0 {
                thread::sleep(PROBE_INTERVAL);
            }
            mm2s.status().is_set(DmaStatus::Halted)
        });
        if supported {
            info!("KCAP: ready, parse buffer at {:#x}", buffer.phys_addr());
        } else {
            error!("KCAP: DMA did not halt after reset, capability parsing unavailable");
        }

        Ok(Kcap {
            dma,
            gpio,
            mm2s_irq,
            s2mm_irq,
            state: Mutex::new(ParseState {
                buffer,
                mm2s: TransferState::Idle,
                s2mm: TransferState::Idle,
            }),
            supported,
        })
    }

    /// Parse the capability map at `src` into the driver's own buffer.
    pub fn parse_kcap_map(&self, src: u64) -> Result<usize, DmaError> {
        let dst = self.lock().buffer.phys_addr();
        self.parse(dst, src)
    }

    /// Read back the first `count` entries of the driver's parse buffer.
    pub fn parsed_caps(&self, count: usize) -> Vec<ParsedCapIndex> {
        let state = self.lock();
        (0..count.min(MAX_CAP_INDEX))
            .map(|index| state.buffer.read_obj(index * PARSED_CAP_INDEX_SIZE))
            .collect()
    }

    pub fn parse_buffer_addr(&self) -> u64 {
        self.lock().buffer.phys_addr()
    }

    /// Terminal states of the last MM2S and S2MM transfers.
    pub fn last_state(&self) -> (TransferState, TransferState) {
        let state = self.lock();
        (state.mm2s, state.s2mm)
    }

    /// Number of entries the parser saw in the last map.
    pub fn total_kcap_count(&self) -> u32 {
        Axigpio::new(self.gpio.as_ref()).total_kcap_count()
    }

    pub fn dump_registers(&self) {
        AxidmaChannel::new(self.dma.as_ref(), &MM2S).dump_registers();
        AxidmaChannel::new(self.dma.as_ref(), &S2MM).dump_registers();
    }

    fn lock(&self) -> MutexGuard<'_, ParseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream(
        channel: &AxidmaChannel<'_>,
        irq: &dyn Completion,
        state: &mut TransferState,
        addr: u64,
        len: usize,
    ) -> Result<(), DmaError> {
        *state = TransferState::Configuring;
        channel.control().modify(
            AxidmaControl::RunStop::SET + AxidmaControl::IocIrqEn::SET + AxidmaControl::ErrIrqEn::SET,
        );
        channel.set_addr(addr);

        *state = TransferState::Running;
        channel.length().write(AxidmaLength::Length.val(len as u32));

        let result = await_completion(channel.name(), &channel.status(), irq, TransferMode::Simple);
        *state = match result {
            Ok(()) => TransferState::Completed,
            Err(_) => {
                channel.dump_registers();
                TransferState::Faulted
            }
        };
        result
    }
}

impl CapParser for Kcap {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn parse(&self, dst: u64, src: u64) -> Result<usize, DmaError> {
        if !self.supported {
            return Err(DmaError::Unsupported);
        }
        check_range("capability map", src, KCAP_MAP_SIZE)?;
        check_range("parse destination", dst, PARSED_BUFFER_SIZE)?;

        let mut state = self.lock();
        let mm2s = AxidmaChannel::new(self.dma.as_ref(), &MM2S);
        Self::stream(&mm2s, self.mm2s_irq.as_ref(), &mut state.mm2s, src, KCAP_MAP_SIZE)?;

        let gpio = Axigpio::new(self.gpio.as_ref());
        let mut valid = gpio.valid_kcap_count() as usize;
        debug!(
            "KCAP: {valid} of {} capability entries valid",
            gpio.total_kcap_count()
        );
        if valid == 0 {
            return Ok(0);
        }
        if valid > MAX_CAP_INDEX {
            warn!("KCAP: parser reported {valid} entries, limiting to {MAX_CAP_INDEX}");
            valid = MAX_CAP_INDEX;
        }

        let s2mm = AxidmaChannel::new(self.dma.as_ref(), &S2MM);
        Self::stream(
            &s2mm,
            self.s2mm_irq.as_ref(),
            &mut state.s2mm,
            dst,
            valid * PARSED_CAP_INDEX_SIZE,
        )?;
        Ok(valid)
    }
}
