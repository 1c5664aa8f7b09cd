// Licensed under the Apache-2.0 license.

//! Typed register views over a [`RegisterBus`].
//!
//! [`BusRegister`] implements the `tock-registers` `Readable`/`Writeable`
//! interfaces, so every register gets `modify` (read-modify-write of named
//! fields only), `is_set`, `read` and `extract` for free.

use core::marker::PhantomData;

use dma_registers::axicdma::bits::{AxicdmaBytesToTransfer, AxicdmaControl};
use dma_registers::axicdma::regs as cdma;
use dma_registers::axidma::bits::{AxidmaControl, AxidmaLength};
use dma_registers::axidma::regs as axidma;
use dma_registers::axigpio::regs as gpio;
use dma_registers::DmaStatus;
use log::debug;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::RegisterLongName;

use crate::hil::RegisterBus;

/// One 32-bit register at a fixed offset of a register window.
pub struct BusRegister<'a, R: RegisterLongName = ()> {
    bus: &'a dyn RegisterBus,
    offset: usize,
    associated_register: PhantomData<R>,
}

impl<'a, R: RegisterLongName> BusRegister<'a, R> {
    pub fn new(bus: &'a dyn RegisterBus, offset: usize) -> Self {
        BusRegister {
            bus,
            offset,
            associated_register: PhantomData,
        }
    }
}

impl<R: RegisterLongName> Readable for BusRegister<'_, R> {
    type T = u32;
    type R = R;

    fn get(&self) -> u32 {
        self.bus.read(self.offset)
    }
}

impl<R: RegisterLongName> Writeable for BusRegister<'_, R> {
    type T = u32;
    type R = R;

    fn set(&self, value: u32) {
        self.bus.write(self.offset, value)
    }
}

pub const fn lower_32_bits(addr: u64) -> u32 {
    addr as u32
}

pub const fn upper_32_bits(addr: u64) -> u32 {
    (addr >> 32) as u32
}

/// Write a 64-bit address into its LSB/MSB register pair.
///
/// The MSB half goes first: on the tail-descriptor pair the LSB write is the
/// one that starts the engine, so both halves must be in place before it.
fn write_addr(bus: &dyn RegisterBus, lsb: usize, msb: usize, addr: u64) {
    bus.write(msb, upper_32_bits(addr));
    bus.write(lsb, lower_32_bits(addr));
}

/// Register window of the AXI CDMA engine.
#[derive(Clone, Copy)]
pub struct Axicdma<'a> {
    bus: &'a dyn RegisterBus,
}

impl<'a> Axicdma<'a> {
    pub fn new(bus: &'a dyn RegisterBus) -> Self {
        Axicdma { bus }
    }

    pub fn control(&self) -> BusRegister<'a, AxicdmaControl::Register> {
        BusRegister::new(self.bus, cdma::CONTROL)
    }

    pub fn status(&self) -> BusRegister<'a, DmaStatus::Register> {
        BusRegister::new(self.bus, cdma::STATUS)
    }

    /// Writing a non-zero count starts a simple-mode transfer.
    pub fn bytes_to_transfer(&self) -> BusRegister<'a, AxicdmaBytesToTransfer::Register> {
        BusRegister::new(self.bus, cdma::BYTES_TO_TRANSFER)
    }

    pub fn set_src_addr(&self, addr: u64) {
        write_addr(self.bus, cdma::SRC_ADDR, cdma::SRC_ADDR_MSB, addr);
    }

    pub fn set_dst_addr(&self, addr: u64) {
        write_addr(self.bus, cdma::DST_ADDR, cdma::DST_ADDR_MSB, addr);
    }

    pub fn set_current_descriptor(&self, addr: u64) {
        write_addr(self.bus, cdma::CURDESC, cdma::CURDESC_MSB, addr);
    }

    /// Starts the engine walking the descriptor chain when in SG mode.
    pub fn set_tail_descriptor(&self, addr: u64) {
        write_addr(self.bus, cdma::TAILDESC, cdma::TAILDESC_MSB, addr);
    }

    /// Soft reset. The bit clears itself once the engine is back to idle.
    pub fn reset(&self) {
        self.control().modify(AxicdmaControl::Reset::SET);
    }

    pub fn is_idle(&self) -> bool {
        self.status().is_set(DmaStatus::Idle)
    }

    pub fn dump_registers(&self) {
        let status = self.status().extract();
        debug!("CDMACR: {:#010x}", self.control().get());
        debug!("CDMASR: {:#010x}", status.get());
        debug!(
            "CDMASR: idle={} sg_incld={} dma_int_err={} dma_slv_err={} dma_dec_err={} \
             sg_int_err={} sg_slv_err={} sg_dec_err={} ioc_irq={} dly_irq={} err_irq={} \
             irq_threshold_sts={:#x} irq_delay_sts={:#x}",
            status.is_set(DmaStatus::Idle),
            status.is_set(DmaStatus::SgIncld),
            status.is_set(DmaStatus::DmaIntErr),
            status.is_set(DmaStatus::DmaSlvErr),
            status.is_set(DmaStatus::DmaDecErr),
            status.is_set(DmaStatus::SgIntErr),
            status.is_set(DmaStatus::SgSlvErr),
            status.is_set(DmaStatus::SgDecErr),
            status.is_set(DmaStatus::IocIrq),
            status.is_set(DmaStatus::DlyIrq),
            status.is_set(DmaStatus::ErrIrq),
            status.read(DmaStatus::IrqThresholdSts),
            status.read(DmaStatus::IrqDelaySts),
        );
        debug!("SA: {:#010x}", self.bus.read(cdma::SRC_ADDR));
        debug!("DA: {:#010x}", self.bus.read(cdma::DST_ADDR));
        debug!("BTT: {:#010x}", self.bus.read(cdma::BYTES_TO_TRANSFER));
        debug!("CURDESC_PNTR: {:#010x}", self.bus.read(cdma::CURDESC));
        debug!("TAILDESC_PNTR: {:#010x}", self.bus.read(cdma::TAILDESC));
    }
}

/// Register offsets of one AXI DMA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap {
    pub name: &'static str,
    pub control: usize,
    pub status: usize,
    pub addr: usize,
    pub addr_msb: usize,
    pub length: usize,
}

pub const MM2S: ChannelMap = ChannelMap {
    name: "MM2S",
    control: axidma::MM2S_CONTROL,
    status: axidma::MM2S_STATUS,
    addr: axidma::MM2S_SRC_ADDR,
    addr_msb: axidma::MM2S_SRC_ADDR_MSB,
    length: axidma::MM2S_LENGTH,
};

pub const S2MM: ChannelMap = ChannelMap {
    name: "S2MM",
    control: axidma::S2MM_CONTROL,
    status: axidma::S2MM_STATUS,
    addr: axidma::S2MM_DST_ADDR,
    addr_msb: axidma::S2MM_DST_ADDR_MSB,
    length: axidma::S2MM_LENGTH,
};

/// One channel of the AXI DMA register window.
#[derive(Clone, Copy)]
pub struct AxidmaChannel<'a> {
    bus: &'a dyn RegisterBus,
    map: &'static ChannelMap,
}

impl<'a> AxidmaChannel<'a> {
    pub fn new(bus: &'a dyn RegisterBus, map: &'static ChannelMap) -> Self {
        AxidmaChannel { bus, map }
    }

    pub fn name(&self) -> &'static str {
        self.map.name
    }

    pub fn control(&self) -> BusRegister<'a, AxidmaControl::Register> {
        BusRegister::new(self.bus, self.map.control)
    }

    pub fn status(&self) -> BusRegister<'a, DmaStatus::Register> {
        BusRegister::new(self.bus, self.map.status)
    }

    /// Writing the length starts the transfer.
    pub fn length(&self) -> BusRegister<'a, AxidmaLength::Register> {
        BusRegister::new(self.bus, self.map.length)
    }

    /// Source address for MM2S, destination address for S2MM.
    pub fn set_addr(&self, addr: u64) {
        write_addr(self.bus, self.map.addr, self.map.addr_msb, addr);
    }

    pub fn dump_registers(&self) {
        let status = self.status().extract();
        debug!(
            "{}_DMASR: {:#010x} halted={} idle={} sg_incld={} dma_int_err={} dma_slv_err={} dma_dec_err={}",
            self.map.name,
            status.get(),
            status.is_set(DmaStatus::Halted),
            status.is_set(DmaStatus::Idle),
            status.is_set(DmaStatus::SgIncld),
            status.is_set(DmaStatus::DmaIntErr),
            status.is_set(DmaStatus::DmaSlvErr),
            status.is_set(DmaStatus::DmaDecErr),
        );
        debug!("{}_ADDR: {:#010x}", self.map.name, self.bus.read(self.map.addr));
        debug!("{}_LENGTH: {:#010x}", self.map.name, self.bus.read(self.map.length));
    }
}

/// GPIO block carrying the capability parser's counters.
#[derive(Clone, Copy)]
pub struct Axigpio<'a> {
    bus: &'a dyn RegisterBus,
}

impl<'a> Axigpio<'a> {
    pub fn new(bus: &'a dyn RegisterBus) -> Self {
        Axigpio { bus }
    }

    pub fn total_kcap_count(&self) -> u32 {
        BusRegister::<()>::new(self.bus, gpio::TOTAL_KCAP_COUNT).get()
    }

    pub fn valid_kcap_count(&self) -> u32 {
        BusRegister::<()>::new(self.bus, gpio::VALID_KCAP_COUNT).get()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    /// Plain register file that remembers every write.
    #[derive(Default)]
    struct RegisterFile {
        values: Mutex<[u32; 32]>,
        writes: Mutex<Vec<(usize, u32)>>,
    }

    impl RegisterBus for RegisterFile {
        fn read(&self, offset: usize) -> u32 {
            self.values.lock().unwrap()[offset / 4]
        }

        fn write(&self, offset: usize, value: u32) {
            self.values.lock().unwrap()[offset / 4] = value;
            self.writes.lock().unwrap().push((offset, value));
        }
    }

    #[test]
    fn test_modify_touches_only_named_field() {
        let file = RegisterFile::default();
        file.write(cdma::CONTROL, 0x00ff_0008);
        let regs = Axicdma::new(&file);

        regs.control().modify(AxicdmaControl::IocIrqEn::SET);
        assert_eq!(file.read(cdma::CONTROL), 0x00ff_1008);

        regs.control().modify(AxicdmaControl::SgMode::CLEAR);
        assert_eq!(file.read(cdma::CONTROL), 0x00ff_1000);
        assert_eq!(regs.control().read(AxicdmaControl::IrqThreshold), 0xff);
    }

    #[test]
    fn test_address_pairs_write_msb_before_lsb() {
        let file = RegisterFile::default();
        let regs = Axicdma::new(&file);
        regs.set_tail_descriptor(0x0000_0001_2345_6780);

        let writes = file.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![(cdma::TAILDESC_MSB, 0x1), (cdma::TAILDESC, 0x2345_6780)]
        );
    }

    #[test]
    fn test_axidma_channels_use_separate_blocks() {
        let file = RegisterFile::default();
        AxidmaChannel::new(&file, &MM2S).set_addr(0x1000);
        AxidmaChannel::new(&file, &S2MM).set_addr(0x2000);
        assert_eq!(file.read(axidma::MM2S_SRC_ADDR), 0x1000);
        assert_eq!(file.read(axidma::S2MM_DST_ADDR), 0x2000);
    }
}
