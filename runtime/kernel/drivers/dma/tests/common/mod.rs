// Licensed under the Apache-2.0 license

#![allow(dead_code)]

use std::sync::Arc;

use dma_driver::hil::RegisterBus;
use dma_driver::{AxiCdma, CachePolicy, DmaAllocator, IrqChannel, Kcap, PhysicalBuffer};
use emulator_periph::{AxiDma, Ram};
use log::LevelFilter;
use rand::Rng;
use simple_logger::SimpleLogger;

pub const RAM_BASE: u64 = 0x1000_0000;
pub const RAM_SIZE: usize = 4 * 1024 * 1024;

pub fn init_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

/// CDMA driver wired to an emulated CDMA.
pub struct CdmaBench {
    pub ram: Ram,
    pub device: Arc<emulator_periph::AxiCdma>,
    pub cdma: AxiCdma,
}

impl CdmaBench {
    pub fn new(sg_included: bool, sg_enabled: bool) -> Self {
        init_logger();
        let ram = Ram::new(RAM_BASE, RAM_SIZE);
        let irq = IrqChannel::new();
        let device = Arc::new(emulator_periph::AxiCdma::new(ram.clone(), irq.line(), sg_included));
        let cdma = AxiCdma::new(device.clone(), irq, &ram, sg_enabled).unwrap();
        device.clear_log();
        CdmaBench { ram, device, cdma }
    }

    pub fn simple() -> Self {
        Self::new(true, false)
    }

    pub fn scatter_gather() -> Self {
        Self::new(true, true)
    }

    pub fn with_max_btt(mut self, max_btt: u32) -> Self {
        self.cdma = self.cdma.with_max_btt(max_btt);
        self
    }

    pub fn alloc(&self, len: usize) -> PhysicalBuffer {
        self.ram.alloc(len, CachePolicy::Uncached).unwrap()
    }

    /// Source filled with random bytes and a zeroed destination.
    pub fn buffers(&self, len: usize) -> (PhysicalBuffer, PhysicalBuffer, Vec<u8>) {
        let src = self.alloc(len);
        let dst = self.alloc(len);
        let data = random_bytes(len);
        src.write(0, &data);
        (src, dst, data)
    }

    /// Offsets of register writes since the last `clear_log`.
    pub fn written_offsets(&self) -> Vec<usize> {
        self.device.write_log().iter().map(|write| write.offset).collect()
    }
}

/// Capability parser driver wired to an emulated AXI DMA and GPIO.
pub struct KcapBench {
    pub ram: Ram,
    pub device: Arc<AxiDma>,
    pub kcap: Kcap,
}

impl KcapBench {
    pub fn new() -> Self {
        init_logger();
        let ram = Ram::new(RAM_BASE, RAM_SIZE);
        let (mm2s_irq, s2mm_irq) = (IrqChannel::new(), IrqChannel::new());
        let device = Arc::new(AxiDma::new(ram.clone(), mm2s_irq.line(), s2mm_irq.line()));
        let gpio: Arc<dyn RegisterBus> = Arc::new(device.gpio());
        let kcap = Kcap::new(device.clone(), gpio, mm2s_irq, s2mm_irq, &ram).unwrap();
        KcapBench { ram, device, kcap }
    }

    pub fn alloc(&self, len: usize) -> PhysicalBuffer {
        self.ram.alloc(len, CachePolicy::Uncached).unwrap()
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}

pub fn read_all(buffer: &PhysicalBuffer) -> Vec<u8> {
    let mut data = vec![0u8; buffer.len()];
    buffer.read(0, &mut data);
    data
}
