// Licensed under the Apache-2.0 license

//! Model of an AXI DMA core (PG021) in direct register mode whose MM2S stream
//! feeds a capability parser and whose S2MM stream carries the parsed
//! entries back. The parser's counters are read through [`AxiGpio`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dma_driver::hil::RegisterBus;
use dma_driver::kcap::{CapIndex, ParsedCapIndex, CAP_INDEX_SIZE, PARSED_CAP_INDEX_SIZE};
use dma_driver::IrqLine;
use dma_registers::axidma::bits::AxidmaControl;
use dma_registers::axidma::regs::*;
use dma_registers::axigpio::regs::{TOTAL_KCAP_COUNT, VALID_KCAP_COUNT};
use dma_registers::DmaStatus;
use log::debug;
use tock_registers::fields::FieldValue;
use tock_registers::LocalRegisterCopy;
use zerocopy::{FromZeros, IntoBytes};

use crate::axicdma::Fault;
use crate::ram::Ram;
use crate::AxiAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Mm2s,
    S2mm,
}

#[derive(Default)]
struct KcapCounters {
    total: AtomicU32,
    valid: AtomicU32,
}

struct Channel {
    control: LocalRegisterCopy<u32, AxidmaControl::Register>,
    status: LocalRegisterCopy<u32, DmaStatus::Register>,
    addr: AxiAddr,
    length: u32,
    irq: IrqLine,
    starts: usize,
}

impl Channel {
    fn new(irq: IrqLine) -> Self {
        let mut channel = Channel {
            control: LocalRegisterCopy::new(0),
            status: LocalRegisterCopy::new(0),
            addr: AxiAddr::default(),
            length: 0,
            irq,
            starts: 0,
        };
        channel.reset();
        channel
    }

    fn reset(&mut self) {
        self.control = LocalRegisterCopy::new(0);
        self.control.modify(AxidmaControl::IrqThreshold.val(1));
        self.status = LocalRegisterCopy::new(0);
        self.status.modify(DmaStatus::Halted::SET);
        self.addr = AxiAddr::default();
        self.length = 0;
        self.irq.set_level(false);
    }

    fn write_control(&mut self, value: u32) {
        self.control.set(value);
        if self.control.is_set(AxidmaControl::RunStop) {
            self.status
                .modify(DmaStatus::Halted::CLEAR + DmaStatus::Idle::SET);
        } else {
            self.status.modify(DmaStatus::Halted::SET);
        }
        self.update_irq_level();
    }

    fn clear_interrupts(&mut self, value: u32) {
        let written = LocalRegisterCopy::<u32, DmaStatus::Register>::new(value);
        for bit in [DmaStatus::IocIrq, DmaStatus::DlyIrq, DmaStatus::ErrIrq] {
            if written.is_set(bit) {
                self.status.modify(bit.val(0));
            }
        }
        self.update_irq_level();
    }

    fn update_irq_level(&self) {
        let (status, control) = (&self.status, &self.control);
        let level = (status.is_set(DmaStatus::IocIrq) && control.is_set(AxidmaControl::IocIrqEn))
            || (status.is_set(DmaStatus::DlyIrq) && control.is_set(AxidmaControl::DlyIrqEn))
            || (status.is_set(DmaStatus::ErrIrq) && control.is_set(AxidmaControl::ErrIrqEn));
        self.irq.set_level(level);
    }

    fn handle_io_completion(&mut self, result: Result<(), Fault>) {
        self.status.modify(DmaStatus::Idle::SET);
        let bits: FieldValue<u32, DmaStatus::Register> = match result {
            Ok(()) => DmaStatus::IocIrq::SET,
            Err(Fault::Internal) => DmaStatus::ErrIrq::SET + DmaStatus::DmaIntErr::SET,
            Err(Fault::Slave) => DmaStatus::ErrIrq::SET + DmaStatus::DmaSlvErr::SET,
            Err(Fault::Decode) => DmaStatus::ErrIrq::SET + DmaStatus::DmaDecErr::SET,
        };
        self.status.modify(bits);
        self.update_irq_level();
    }
}

struct DmaState {
    mm2s: Channel,
    s2mm: Channel,
    /// Parsed entries waiting on the S2MM stream.
    parsed: Vec<ParsedCapIndex>,
    pending_fault: Option<(Direction, Fault)>,
}

pub struct AxiDma {
    state: Mutex<DmaState>,
    counters: Arc<KcapCounters>,
    ram: Ram,
    responsive: bool,
}

impl AxiDma {
    pub fn new(ram: Ram, mm2s_irq: IrqLine, s2mm_irq: IrqLine) -> Self {
        AxiDma {
            state: Mutex::new(DmaState {
                mm2s: Channel::new(mm2s_irq),
                s2mm: Channel::new(s2mm_irq),
                parsed: Vec::new(),
                pending_fault: None,
            }),
            counters: Arc::default(),
            ram,
            responsive: true,
        }
    }

    /// A device that never leaves reset: every register reads as zero.
    pub fn unresponsive(ram: Ram, mm2s_irq: IrqLine, s2mm_irq: IrqLine) -> Self {
        AxiDma {
            responsive: false,
            ..AxiDma::new(ram, mm2s_irq, s2mm_irq)
        }
    }

    /// The GPIO block wired to the parser's counters.
    pub fn gpio(&self) -> AxiGpio {
        AxiGpio {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Fail the next transfer on `direction` with `fault`.
    pub fn inject_fault(&self, direction: Direction, fault: Fault) {
        self.lock().pending_fault = Some((direction, fault));
    }

    /// Transfers started on `direction`.
    pub fn starts(&self, direction: Direction) -> usize {
        let state = self.lock();
        match direction {
            Direction::Mm2s => state.mm2s.starts,
            Direction::S2mm => state.s2mm.starts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DmaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self, state: &mut DmaState) {
        state.mm2s.reset();
        state.s2mm.reset();
        state.parsed.clear();
        self.counters.total.store(0, Ordering::SeqCst);
        self.counters.valid.store(0, Ordering::SeqCst);
    }

    fn take_fault(state: &mut DmaState, direction: Direction) -> Option<Fault> {
        match state.pending_fault {
            Some((target, fault)) if target == direction => {
                state.pending_fault = None;
                Some(fault)
            }
            _ => None,
        }
    }

    /// Stream `length` bytes of capability map into the parser.
    fn start_mm2s(&self, state: &mut DmaState) {
        state.mm2s.starts += 1;
        state.mm2s.status.modify(DmaStatus::Idle::CLEAR);
        let addr = state.mm2s.addr.get();
        let count = state.mm2s.length as usize / CAP_INDEX_SIZE;
        let result = match Self::take_fault(state, Direction::Mm2s) {
            Some(fault) => Err(fault),
            None => {
                let mut entries = vec![CapIndex::new_zeroed(); count];
                self.ram
                    .read(addr, entries.as_mut_slice().as_mut_bytes())
                    .map_err(Fault::from)
                    .map(|()| entries)
            }
        };
        let result = result.map(|entries| {
            state.parsed = entries
                .iter()
                .filter(|entry| entry.is_valid())
                .map(|entry| ParsedCapIndex {
                    kcap: entry.kcap(),
                    badge: entry.badge,
                })
                .collect();
            self.counters.total.store(count as u32, Ordering::SeqCst);
            self.counters
                .valid
                .store(state.parsed.len() as u32, Ordering::SeqCst);
            debug!(
                "axidma: parsed {} of {count} capability entries at {addr:#x}",
                state.parsed.len()
            );
        });
        state.mm2s.handle_io_completion(result);
    }

    /// Drain parsed entries to memory, up to `length` bytes.
    fn start_s2mm(&self, state: &mut DmaState) {
        state.s2mm.starts += 1;
        state.s2mm.status.modify(DmaStatus::Idle::CLEAR);
        let addr = state.s2mm.addr.get();
        let count = (state.s2mm.length as usize / PARSED_CAP_INDEX_SIZE).min(state.parsed.len());
        let result = match Self::take_fault(state, Direction::S2mm) {
            Some(fault) => Err(fault),
            None => self
                .ram
                .write(addr, state.parsed[..count].as_bytes())
                .map_err(Fault::from),
        };
        if result.is_ok() {
            state.parsed.drain(..count);
            debug!("axidma: streamed {count} parsed entries to {addr:#x}");
        }
        state.s2mm.handle_io_completion(result);
    }
}

impl RegisterBus for AxiDma {
    fn read(&self, offset: usize) -> u32 {
        if !self.responsive {
            return 0;
        }
        let state = self.lock();
        match offset {
            MM2S_CONTROL => state.mm2s.control.get(),
            MM2S_STATUS => state.mm2s.status.get(),
            MM2S_SRC_ADDR => state.mm2s.addr.lo,
            MM2S_SRC_ADDR_MSB => state.mm2s.addr.hi,
            MM2S_LENGTH => state.mm2s.length,
            S2MM_CONTROL => state.s2mm.control.get(),
            S2MM_STATUS => state.s2mm.status.get(),
            S2MM_DST_ADDR => state.s2mm.addr.lo,
            S2MM_DST_ADDR_MSB => state.s2mm.addr.hi,
            S2MM_LENGTH => state.s2mm.length,
            _ => 0,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        if !self.responsive {
            return;
        }
        let mut state = self.lock();
        let reset = LocalRegisterCopy::<u32, AxidmaControl::Register>::new(value)
            .is_set(AxidmaControl::Reset);
        match offset {
            MM2S_CONTROL | S2MM_CONTROL if reset => self.reset(&mut state),
            MM2S_CONTROL => state.mm2s.write_control(value),
            S2MM_CONTROL => state.s2mm.write_control(value),
            MM2S_STATUS => state.mm2s.clear_interrupts(value),
            S2MM_STATUS => state.s2mm.clear_interrupts(value),
            MM2S_SRC_ADDR => state.mm2s.addr.lo = value,
            MM2S_SRC_ADDR_MSB => state.mm2s.addr.hi = value,
            S2MM_DST_ADDR => state.s2mm.addr.lo = value,
            S2MM_DST_ADDR_MSB => state.s2mm.addr.hi = value,
            MM2S_LENGTH => {
                state.mm2s.length = value;
                if state.mm2s.control.is_set(AxidmaControl::RunStop) {
                    self.start_mm2s(&mut state);
                }
            }
            S2MM_LENGTH => {
                state.s2mm.length = value;
                if state.s2mm.control.is_set(AxidmaControl::RunStop) {
                    self.start_s2mm(&mut state);
                }
            }
            _ => {}
        }
    }
}

/// GPIO block exposing the capability parser's entry counters.
#[derive(Clone)]
pub struct AxiGpio {
    counters: Arc<KcapCounters>,
}

impl RegisterBus for AxiGpio {
    fn read(&self, offset: usize) -> u32 {
        match offset {
            TOTAL_KCAP_COUNT => self.counters.total.load(Ordering::SeqCst),
            VALID_KCAP_COUNT => self.counters.valid.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    fn write(&self, _offset: usize, _value: u32) {}
}
