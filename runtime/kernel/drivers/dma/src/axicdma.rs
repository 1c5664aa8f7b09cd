// Licensed under the Apache-2.0 license

// This is a driver for the AMD LogiCORE IP AXI Central Direct Memory Access (CDMA) core.
// Reference: https://docs.amd.com/r/en-US/pg034-axi-cdma
// Both simple and scatter-gather transfer modes are supported.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use dma_registers::DmaStatus;
use log::{debug, error, info, warn};
use tock_registers::interfaces::Readable;

use crate::buffer::CachePolicy;
use crate::descriptor::{DescriptorRing, MAX_BTT, MAX_TD_COUNT, TD_DS_SIZE};
use crate::engine::{TransferEngine, TransferState, IRQ_THRESHOLD_MAX};
use crate::error::DmaError;
use crate::hil::{Completion, DmaAllocator, MemCopy, RegisterBus};
use crate::regs::Axicdma;

/// Times the idle bit is polled after reset before giving up on the device.
pub const PROBE_ATTEMPTS: usize = 50;
pub const PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// The engine is programmed with 32-bit addresses only.
pub const ADDRESS_LIMIT: u64 = 1 << 32;

/// Descriptors in one chain: bounded by the storage and the 8-bit interrupt
/// threshold, since completion is signalled once the whole chain is done.
pub const MAX_CHAIN_LEN: usize = if MAX_TD_COUNT < IRQ_THRESHOLD_MAX {
    MAX_TD_COUNT
} else {
    IRQ_THRESHOLD_MAX
};

pub struct AxiCdma {
    registers: Arc<dyn RegisterBus>,
    irq: Arc<dyn Completion>,
    engine: Mutex<TransferEngine>,
    supported: bool,
    sg_enabled: bool,
    max_btt: u32,
}

impl AxiCdma {
    /// Bring up the engine: allocate descriptor storage, arm the interrupt
    /// channel and probe the device.
    ///
    /// An unresponsive device is not an error here; the driver reports itself
    /// unsupported instead. Scatter-gather is used only when requested and
    /// present in hardware.
    pub fn new(
        registers: Arc<dyn RegisterBus>,
        irq: Arc<dyn Completion>,
        allocator: &dyn DmaAllocator,
        sg_enabled: bool,
    ) -> Result<AxiCdma, DmaError> {
        let storage = allocator.alloc(TD_DS_SIZE, CachePolicy::Uncached)?;
        let ring = DescriptorRing::new(storage);
        irq.acknowledge()?;

        let regs = Axicdma::new(registers.as_ref());
        regs.reset();
        let supported = probe(&regs);
        let mut sg_enabled = sg_enabled;
        if !supported {
            error!("CDMA: device did not become idle after reset, hardware copy unavailable");
            sg_enabled = false;
        } else if sg_enabled && !regs.status().is_set(DmaStatus::SgIncld) {
            warn!("CDMA: scatter-gather requested but not present in hardware, using simple mode");
            sg_enabled = false;
        }
        if supported {
            info!(
                "CDMA: ready in {} mode, descriptors at {:#x}",
                if sg_enabled { "scatter-gather" } else { "simple" },
                ring.base()
            );
        }

        Ok(AxiCdma {
            registers,
            irq,
            engine: Mutex::new(TransferEngine::new(ring)),
            supported,
            sg_enabled,
            max_btt: MAX_BTT,
        })
    }

    /// Lower the per-transfer byte limit, clamped to `1..=MAX_BTT`.
    pub fn with_max_btt(mut self, max_btt: u32) -> Self {
        self.max_btt = max_btt.clamp(1, MAX_BTT);
        self
    }

    pub fn max_btt(&self) -> u32 {
        self.max_btt
    }

    pub fn is_sg_enabled(&self) -> bool {
        self.sg_enabled
    }

    /// State of the most recent transfer.
    pub fn last_state(&self) -> TransferState {
        self.lock().state()
    }

    pub fn dump_registers(&self) {
        Axicdma::new(self.registers.as_ref()).dump_registers();
    }

    fn lock(&self) -> MutexGuard<'_, TransferEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn multiple_simple_memcpy(
        &self,
        engine: &mut TransferEngine,
        dst: u64,
        src: u64,
        size: usize,
    ) -> Result<(), DmaError> {
        let regs = Axicdma::new(self.registers.as_ref());
        let mut offset = 0u64;
        let mut remaining = size;
        while remaining > 0 {
            let btt = remaining.min(self.max_btt as usize);
            engine.run_simple(&regs, self.irq.as_ref(), dst + offset, src + offset, btt as u32)?;
            offset += btt as u64;
            remaining -= btt;
        }
        Ok(())
    }

    fn sg_memcpy(
        &self,
        engine: &mut TransferEngine,
        dst: u64,
        src: u64,
        size: usize,
    ) -> Result<(), DmaError> {
        let regs = Axicdma::new(self.registers.as_ref());
        let chain_bytes = MAX_CHAIN_LEN * self.max_btt as usize;
        let mut offset = 0u64;
        let mut remaining = size;
        while remaining > 0 {
            let len = remaining.min(chain_bytes);
            engine.run_scatter_gather(
                &regs,
                self.irq.as_ref(),
                dst + offset,
                src + offset,
                len,
                self.max_btt,
            )?;
            offset += len as u64;
            remaining -= len;
        }
        Ok(())
    }
}

impl MemCopy for AxiCdma {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn copy(&self, dst: u64, src: u64, size: usize) -> Result<(), DmaError> {
        if !self.supported {
            return Err(DmaError::Unsupported);
        }
        check_range("destination", dst, size)?;
        check_range("source", src, size)?;
        if size == 0 {
            return Ok(());
        }

        debug!("CDMA: copy {size:#x} bytes {src:#x} -> {dst:#x}");
        let mut engine = self.lock();
        if self.sg_enabled {
            self.sg_memcpy(&mut engine, dst, src, size)
        } else {
            self.multiple_simple_memcpy(&mut engine, dst, src, size)
        }
    }
}

fn probe(regs: &Axicdma<'_>) -> bool {
    for _ in 0..PROBE_ATTEMPTS {
        if regs.is_idle() {
            return true;
        }
        thread::sleep(PROBE_INTERVAL);
    }
    false
}

/// Reject ranges the engine cannot address before touching the hardware.
pub(crate) fn check_range(what: &str, addr: u64, size: usize) -> Result<(), DmaError> {
    match addr.checked_add(size as u64) {
        Some(end) if addr < ADDRESS_LIMIT && end <= ADDRESS_LIMIT => Ok(()),
        _ => {
            error!("DMA: {what} range {addr:#x}+{size:#x} is beyond the 4 GiB address limit");
            Err(DmaError::InvalidAddress)
        }
    }
}
