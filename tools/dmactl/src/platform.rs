// Licensed under the Apache-2.0 license

use std::sync::Arc;

use anyhow::Result;
use dma_config::DmaConfig;
use dma_driver::{AxiCdma, DmaAllocator, IrqChannel, Kcap};
use emulator_periph::{AxiDma, Ram};
use log::info;

/// Physical window of the emulated RAM.
pub const EMULATED_RAM_BASE: u64 = 0x1000_0000;
pub const EMULATED_RAM_SIZE: usize = 16 * 1024 * 1024;

/// Drivers for the engines named in the configuration, plus the memory
/// their buffers come from.
pub struct Platform {
    pub cdma: Option<AxiCdma>,
    pub kcap: Option<Kcap>,
    pub memory: Box<dyn DmaAllocator>,
}

impl Platform {
    /// Every engine backed by a software model. Configuration only selects
    /// the transfer mode and burst size.
    pub fn emulated(config: &DmaConfig, force_simple: bool) -> Result<Platform> {
        info!("Using emulated DMA hardware");
        let ram = Ram::new(EMULATED_RAM_BASE, EMULATED_RAM_SIZE);

        let cdma_irq = IrqChannel::new();
        let cdma_device = Arc::new(emulator_periph::AxiCdma::new(
            ram.clone(),
            cdma_irq.line(),
            true,
        ));
        let sg_enabled = config.cdma.as_ref().map_or(true, |cdma| cdma.sg_enabled) && !force_simple;
        let mut cdma = AxiCdma::new(cdma_device, cdma_irq, &ram, sg_enabled)?;
        if let Some(max_btt) = config.cdma.as_ref().and_then(|cdma| cdma.max_btt) {
            cdma = cdma.with_max_btt(max_btt);
        }

        let (mm2s_irq, s2mm_irq) = (IrqChannel::new(), IrqChannel::new());
        let dma = Arc::new(AxiDma::new(ram.clone(), mm2s_irq.line(), s2mm_irq.line()));
        let gpio = Arc::new(dma.gpio());
        let kcap = Kcap::new(dma, gpio, mm2s_irq, s2mm_irq, &ram)?;

        Ok(Platform {
            cdma: Some(cdma),
            kcap: Some(kcap),
            memory: Box::new(ram),
        })
    }

    #[cfg(feature = "uio")]
    pub fn hardware(config: &DmaConfig, force_simple: bool) -> Result<Platform> {
        use anyhow::Context;
        use dma_driver::uio::{UioInterrupt, UioMemory, UioRegisters};

        let Some(memory) = &config.memory else {
            anyhow::bail!("hardware mode needs a [memory] section");
        };
        let memory = UioMemory::open(memory.uio).context("opening DMA memory")?;

        let cdma = match &config.cdma {
            Some(cdma_config) => {
                let uio = cdma_config
                    .uio
                    .context("cdma.uio is required in hardware mode")?;
                info!(
                    "CDMA at {:#x} (irq {}) through uio{uio}",
                    cdma_config.address, cdma_config.irq
                );
                let registers = Arc::new(UioRegisters::open(uio)?);
                let irq = Arc::new(UioInterrupt::open(uio)?);
                let mut cdma = AxiCdma::new(
                    registers,
                    irq,
                    &memory,
                    cdma_config.sg_enabled && !force_simple,
                )?;
                if let Some(max_btt) = cdma_config.max_btt {
                    cdma = cdma.with_max_btt(max_btt);
                }
                Some(cdma)
            }
            None => None,
        };

        let kcap = match &config.kcap {
            Some(kcap_config) => {
                let (Some(mm2s), Some(s2mm), Some(gpio)) =
                    (kcap_config.mm2s_uio, kcap_config.s2mm_uio, kcap_config.gpio_uio)
                else {
                    anyhow::bail!("kcap.mm2s_uio, kcap.s2mm_uio and kcap.gpio_uio are required in hardware mode");
                };
                info!(
                    "KCAP DMA at {:#x}, GPIO at {:#x}",
                    kcap_config.dma_address, kcap_config.gpio_address
                );
                Some(Kcap::new(
                    Arc::new(UioRegisters::open(mm2s)?),
                    Arc::new(UioRegisters::open(gpio)?),
                    Arc::new(UioInterrupt::open(mm2s)?),
                    Arc::new(UioInterrupt::open(s2mm)?),
                    &memory,
                )?)
            }
            None => None,
        };

        Ok(Platform {
            cdma,
            kcap,
            memory: Box::new(memory),
        })
    }

    #[cfg(not(feature = "uio"))]
    pub fn hardware(_config: &DmaConfig, _force_simple: bool) -> Result<Platform> {
        anyhow::bail!("built without the `uio` feature; run with --emulate")
    }
}
