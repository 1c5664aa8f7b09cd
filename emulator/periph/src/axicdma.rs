// Licensed under the Apache-2.0 license

//! Model of the AXI CDMA core (PG034), simple and scatter-gather modes.
//!
//! Transfers execute synchronously inside the register write that starts
//! them; the interrupt line is raised before the write returns.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use dma_driver::descriptor::TransferDescriptor;
use dma_driver::hil::RegisterBus;
use dma_driver::IrqLine;
use dma_registers::axicdma::bits::{AxicdmaControl, TdStatus};
use dma_registers::axicdma::regs::*;
use dma_registers::DmaStatus;
use log::debug;
use tock_registers::fields::FieldValue;
use tock_registers::LocalRegisterCopy;
use zerocopy::{FromZeros, IntoBytes};

use crate::ram::{DmaOpError, Ram};
use crate::AxiAddr;

/// Bound on descriptors walked per start, so a chain that never reaches the
/// tail ends in an SG internal error instead of hanging the model.
const MAX_CHAIN_WALK: usize = 4096;
const TD_STATUS_OFFSET: u64 = 28;

/// Error a transfer can be made to fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Internal,
    Slave,
    Decode,
}

impl From<DmaOpError> for Fault {
    fn from(_: DmaOpError) -> Self {
        Fault::Decode
    }
}

/// A register write as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub offset: usize,
    pub value: u32,
    pub thread: ThreadId,
}

/// A block of data moved by the engine: one simple transfer or one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub src: u64,
    pub dst: u64,
    pub len: usize,
}

enum ErrorSource {
    DataMover(Fault),
    Descriptor(Fault),
}

impl ErrorSource {
    fn status_bits(&self) -> FieldValue<u32, DmaStatus::Register> {
        match self {
            ErrorSource::DataMover(Fault::Internal) => DmaStatus::DmaIntErr::SET,
            ErrorSource::DataMover(Fault::Slave) => DmaStatus::DmaSlvErr::SET,
            ErrorSource::DataMover(Fault::Decode) => DmaStatus::DmaDecErr::SET,
            ErrorSource::Descriptor(Fault::Internal) => DmaStatus::SgIntErr::SET,
            ErrorSource::Descriptor(Fault::Slave) => DmaStatus::SgSlvErr::SET,
            ErrorSource::Descriptor(Fault::Decode) => DmaStatus::SgDecErr::SET,
        }
    }
}

fn td_status_bits(fault: Fault) -> FieldValue<u32, TdStatus::Register> {
    match fault {
        Fault::Internal => TdStatus::DmaIntErr::SET,
        Fault::Slave => TdStatus::DmaSlvErr::SET,
        Fault::Decode => TdStatus::DmaDecErr::SET,
    }
}

struct CdmaState {
    control: LocalRegisterCopy<u32, AxicdmaControl::Register>,
    status: LocalRegisterCopy<u32, DmaStatus::Register>,
    curdesc: AxiAddr,
    taildesc: AxiAddr,
    src_addr: AxiAddr,
    dst_addr: AxiAddr,
    btt: u32,

    pending_fault: Option<Fault>,
    spurious: bool,
    write_log: Vec<RegisterWrite>,
    segments: Vec<Segment>,
    starts: usize,
}

pub struct AxiCdma {
    state: Mutex<CdmaState>,
    ram: Ram,
    irq: IrqLine,
    sg_included: bool,
    responsive: bool,
}

impl AxiCdma {
    pub fn new(ram: Ram, irq: IrqLine, sg_included: bool) -> Self {
        let cdma = AxiCdma {
            state: Mutex::new(CdmaState {
                control: LocalRegisterCopy::new(0),
                status: LocalRegisterCopy::new(0),
                curdesc: AxiAddr::default(),
                taildesc: AxiAddr::default(),
                src_addr: AxiAddr::default(),
                dst_addr: AxiAddr::default(),
                btt: 0,
                pending_fault: None,
                spurious: false,
                write_log: Vec::new(),
                segments: Vec::new(),
                starts: 0,
            }),
            ram,
            irq,
            sg_included,
            responsive: true,
        };
        cdma.reset(&mut cdma.lock());
        cdma
    }

    /// A device that never leaves reset: every register reads as zero.
    pub fn unresponsive(ram: Ram, irq: IrqLine) -> Self {
        AxiCdma {
            responsive: false,
            ..AxiCdma::new(ram, irq, false)
        }
    }

    /// Fail the next simple transfer or descriptor with `fault`.
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().pending_fault = Some(fault);
    }

    /// Answer the next start with an interrupt carrying no status.
    pub fn inject_spurious_interrupt(&self) {
        self.lock().spurious = true;
    }

    pub fn write_log(&self) -> Vec<RegisterWrite> {
        self.lock().write_log.clone()
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.lock().segments.clone()
    }

    /// Number of transfers started: BTT writes in simple mode, tail pointer
    /// writes in scatter-gather mode.
    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.write_log.clear();
        state.segments.clear();
        state.starts = 0;
    }

    fn lock(&self) -> MutexGuard<'_, CdmaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self, state: &mut CdmaState) {
        state.control = LocalRegisterCopy::new(0);
        state.control.modify(AxicdmaControl::IrqThreshold.val(1));
        state.status = LocalRegisterCopy::new(0);
        state.status.modify(DmaStatus::Idle::SET);
        if self.sg_included {
            state.status.modify(DmaStatus::SgIncld::SET);
        }
        state.curdesc = AxiAddr::default();
        state.taildesc = AxiAddr::default();
        state.src_addr = AxiAddr::default();
        state.dst_addr = AxiAddr::default();
        state.btt = 0;
        self.irq.set_level(false);
    }

    fn write_control(&self, state: &mut CdmaState, value: u32) {
        let mut control = LocalRegisterCopy::<u32, AxicdmaControl::Register>::new(value);
        if control.is_set(AxicdmaControl::Reset) {
            self.reset(state);
            return;
        }
        if !self.sg_included {
            control.modify(AxicdmaControl::SgMode::CLEAR);
        }
        if control.read(AxicdmaControl::IrqThreshold) == 0 {
            let threshold = state.control.read(AxicdmaControl::IrqThreshold);
            control.modify(AxicdmaControl::IrqThreshold.val(threshold));
        }
        state.control = control;
        self.update_irq_level(state);
    }

    fn clear_interrupts(&self, state: &mut CdmaState, value: u32) {
        let written = LocalRegisterCopy::<u32, DmaStatus::Register>::new(value);
        if written.is_set(DmaStatus::IocIrq) {
            state.status.modify(DmaStatus::IocIrq::CLEAR);
        }
        if written.is_set(DmaStatus::DlyIrq) {
            state.status.modify(DmaStatus::DlyIrq::CLEAR);
        }
        if written.is_set(DmaStatus::ErrIrq) {
            state.status.modify(DmaStatus::ErrIrq::CLEAR);
        }
        self.update_irq_level(state);
    }

    fn update_irq_level(&self, state: &CdmaState) {
        let (status, control) = (&state.status, &state.control);
        let level = (status.is_set(DmaStatus::IocIrq) && control.is_set(AxicdmaControl::IocIrqEn))
            || (status.is_set(DmaStatus::DlyIrq) && control.is_set(AxicdmaControl::DlyIrqEn))
            || (status.is_set(DmaStatus::ErrIrq) && control.is_set(AxicdmaControl::ErrIrqEn));
        self.irq.set_level(level);
    }

    /// Spurious interrupts replace the transfer they were injected for.
    fn take_spurious(&self, state: &mut CdmaState) -> bool {
        if state.spurious {
            state.spurious = false;
            self.irq.pulse();
            return true;
        }
        false
    }

    fn start_simple(&self, state: &mut CdmaState) {
        state.starts += 1;
        if self.take_spurious(state) {
            return;
        }
        state.status.modify(DmaStatus::Idle::CLEAR);
        let src = state.src_addr.get();
        let dst = state.dst_addr.get();
        let len = state.btt as usize;
        let result = match state.pending_fault.take() {
            Some(fault) => Err(fault),
            None if len == 0 => Err(Fault::Internal),
            None => self.ram.copy(dst, src, len).map_err(Fault::from),
        };
        debug!("axicdma: simple {src:#x} -> {dst:#x} len {len:#x}: {result:?}");
        if result.is_ok() {
            state.segments.push(Segment { src, dst, len });
        }
        self.handle_io_completion(state, result.map_err(ErrorSource::DataMover), true);
    }

    fn start_chain(&self, state: &mut CdmaState) {
        state.starts += 1;
        if self.take_spurious(state) {
            return;
        }
        state.status.modify(DmaStatus::Idle::CLEAR);
        let threshold = state.control.read(AxicdmaControl::IrqThreshold).max(1) as usize;
        let tail = state.taildesc.get();
        let mut addr = state.curdesc.get();
        let mut completed = 0;
        let mut ioc = false;
        let mut result = Err(ErrorSource::Descriptor(Fault::Internal));

        for _ in 0..MAX_CHAIN_WALK {
            let mut td = TransferDescriptor::new_zeroed();
            if self.ram.read(addr, td.as_mut_bytes()).is_err() {
                result = Err(ErrorSource::Descriptor(Fault::Decode));
                break;
            }
            state.curdesc = AxiAddr::from(addr);

            let len = td.bytes_to_transfer() as usize;
            let moved = match state.pending_fault.take() {
                Some(fault) => Err(fault),
                None if len == 0 => Err(Fault::Internal),
                None => self.ram.copy(td.dst(), td.src(), len).map_err(Fault::from),
            };
            let mut td_status = LocalRegisterCopy::<u32, TdStatus::Register>::new(0);
            match moved {
                Ok(()) => td_status.set(TdStatus::Cmplt::SET.value | len as u32),
                Err(fault) => td_status.modify(td_status_bits(fault)),
            }
            let _ = self
                .ram
                .write(addr + TD_STATUS_OFFSET, &td_status.get().to_le_bytes());
            debug!(
                "axicdma: descriptor {addr:#x} {:#x} -> {:#x} len {len:#x}: {moved:?}",
                td.src(),
                td.dst()
            );

            if let Err(fault) = moved {
                result = Err(ErrorSource::DataMover(fault));
                break;
            }
            state.segments.push(Segment {
                src: td.src(),
                dst: td.dst(),
                len,
            });
            completed += 1;
            if completed % threshold == 0 {
                ioc = true;
            }
            if addr == tail {
                result = Ok(());
                break;
            }
            addr = td.next();
        }

        self.handle_io_completion(state, result, ioc);
    }

    fn handle_io_completion(&self, state: &mut CdmaState, result: Result<(), ErrorSource>, ioc: bool) {
        state.status.modify(DmaStatus::Idle::SET);
        match result {
            Ok(()) => {
                if ioc {
                    self.raise_interrupt(state, DmaStatus::IocIrq::SET);
                }
            }
            Err(source) => {
                state.status.modify(source.status_bits());
                self.raise_interrupt(state, DmaStatus::ErrIrq::SET);
            }
        }
    }

    fn raise_interrupt(&self, state: &mut CdmaState, bit: FieldValue<u32, DmaStatus::Register>) {
        state.status.modify(bit);
        self.update_irq_level(state);
    }
}

impl RegisterBus for AxiCdma {
    fn read(&self, offset: usize) -> u32 {
        if !self.responsive {
            return 0;
        }
        let state = self.lock();
        match offset {
            CONTROL => state.control.get(),
            STATUS => state.status.get(),
            CURDESC => state.curdesc.lo,
            CURDESC_MSB => state.curdesc.hi,
            TAILDESC => state.taildesc.lo,
            TAILDESC_MSB => state.taildesc.hi,
            SRC_ADDR => state.src_addr.lo,
            SRC_ADDR_MSB => state.src_addr.hi,
            DST_ADDR => state.dst_addr.lo,
            DST_ADDR_MSB => state.dst_addr.hi,
            BYTES_TO_TRANSFER => state.btt,
            _ => 0,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        let mut state = self.lock();
        state.write_log.push(RegisterWrite {
            offset,
            value,
            thread: thread::current().id(),
        });
        if !self.responsive {
            return;
        }
        match offset {
            CONTROL => self.write_control(&mut state, value),
            STATUS => self.clear_interrupts(&mut state, value),
            CURDESC => state.curdesc.lo = value,
            CURDESC_MSB => state.curdesc.hi = value,
            TAILDESC => {
                state.taildesc.lo = value;
                if state.control.is_set(AxicdmaControl::SgMode) {
                    self.start_chain(&mut state);
                }
            }
            TAILDESC_MSB => state.taildesc.hi = value,
            SRC_ADDR => state.src_addr.lo = value,
            SRC_ADDR_MSB => state.src_addr.hi = value,
            DST_ADDR => state.dst_addr.lo = value,
            DST_ADDR_MSB => state.dst_addr.hi = value,
            BYTES_TO_TRANSFER => {
                state.btt = value;
                if !state.control.is_set(AxicdmaControl::SgMode) {
                    self.start_simple(&mut state);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dma_driver::hil::Completion;
    use dma_driver::IrqChannel;

    const RAM_BASE: u64 = 0x1000_0000;

    fn cdma() -> (AxiCdma, Ram, std::sync::Arc<IrqChannel>) {
        let ram = Ram::new(RAM_BASE, 0x1_0000);
        let channel = IrqChannel::new();
        channel.acknowledge().unwrap();
        (AxiCdma::new(ram.clone(), channel.line(), true), ram, channel)
    }

    #[test]
    fn test_reset_state() {
        let (cdma, _, _) = cdma();
        let status = LocalRegisterCopy::<u32, DmaStatus::Register>::new(cdma.read(STATUS));
        assert!(status.is_set(DmaStatus::Idle));
        assert!(status.is_set(DmaStatus::SgIncld));
        assert_eq!((cdma.read(CONTROL) >> 16) & 0xff, 1);
    }

    #[test]
    fn test_simple_transfer_raises_ioc() {
        let (cdma, ram, channel) = cdma();
        ram.write(RAM_BASE, &[1, 2, 3, 4]).unwrap();
        cdma.write(CONTROL, (1 << 12) | (1 << 14));
        cdma.write(SRC_ADDR, RAM_BASE as u32);
        cdma.write(DST_ADDR, RAM_BASE as u32 + 0x100);
        cdma.write(BYTES_TO_TRANSFER, 4);

        assert!(channel.is_pending());
        let status = LocalRegisterCopy::<u32, DmaStatus::Register>::new(cdma.read(STATUS));
        assert!(status.is_set(DmaStatus::IocIrq));
        let mut buf = [0u8; 4];
        ram.read(RAM_BASE + 0x100, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        // Write-1-to-clear drops the line.
        cdma.write(STATUS, 1 << 12);
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_interrupt_needs_enable() {
        let (cdma, _, channel) = cdma();
        cdma.write(SRC_ADDR, RAM_BASE as u32);
        cdma.write(DST_ADDR, RAM_BASE as u32 + 0x100);
        cdma.write(BYTES_TO_TRANSFER, 4);
        assert!(!channel.is_pending());
        assert_eq!(cdma.segments().len(), 1);
    }

    #[test]
    fn test_out_of_ram_is_decode_error() {
        let (cdma, _, _) = cdma();
        cdma.write(CONTROL, (1 << 12) | (1 << 14));
        cdma.write(SRC_ADDR, 0x10);
        cdma.write(DST_ADDR, RAM_BASE as u32);
        cdma.write(BYTES_TO_TRANSFER, 4);
        let status = LocalRegisterCopy::<u32, DmaStatus::Register>::new(cdma.read(STATUS));
        assert!(status.is_set(DmaStatus::ErrIrq));
        assert!(status.is_set(DmaStatus::DmaDecErr));
        assert!(cdma.segments().is_empty());
    }

    #[test]
    fn test_sg_mode_ignored_without_sg_engine() {
        let ram = Ram::new(RAM_BASE, 0x1000);
        let cdma = AxiCdma::new(ram, IrqChannel::new().line(), false);
        cdma.write(CONTROL, 1 << 3);
        assert_eq!(cdma.read(CONTROL) & (1 << 3), 0);
    }

    #[test]
    fn test_unresponsive_reads_zero_and_logs_writes() {
        let ram = Ram::new(RAM_BASE, 0x1000);
        let cdma = AxiCdma::unresponsive(ram, IrqChannel::new().line());
        cdma.write(CONTROL, 1 << 2);
        assert_eq!(cdma.read(STATUS), 0);
        assert_eq!(cdma.write_log().len(), 1);
    }
}
