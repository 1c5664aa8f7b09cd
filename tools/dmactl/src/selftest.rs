// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use dma_driver::kcap::{CapIndex, KCAP_MAP_SIZE, MAX_CAP_INDEX};
use dma_driver::{AxiCdma, CachePolicy, CapParser, DmaAllocator, Kcap, MemCopy};
use log::info;
use zerocopy::IntoBytes;

/// Word written across the copy source.
pub const PATTERN: u32 = 0xdead_beef;

pub fn memcpy(cdma: &AxiCdma, memory: &dyn DmaAllocator, size: usize) -> Result<()> {
    if !cdma.is_supported() {
        bail!("CDMA did not respond to the probe");
    }
    let src = memory.alloc(size, CachePolicy::Uncached)?;
    let dst = memory.alloc(size, CachePolicy::Uncached)?;

    let pattern: Vec<u8> = PATTERN.to_be_bytes().into_iter().cycle().take(size).collect();
    src.write(0, &pattern);
    dst.write(0, &vec![0; size]);

    info!(
        "memcpy: {size:#x} bytes {:#x} -> {:#x} ({} mode, max_btt {:#x})",
        src.phys_addr(),
        dst.phys_addr(),
        if cdma.is_sg_enabled() { "scatter-gather" } else { "simple" },
        cdma.max_btt()
    );
    cdma.copy(dst.phys_addr(), src.phys_addr(), size)
        .context("hardware copy failed")?;

    let mut copied = vec![0; size];
    dst.read(0, &mut copied);
    if copied != pattern {
        let first = copied
            .iter()
            .zip(&pattern)
            .position(|(a, b)| a != b)
            .unwrap_or_default();
        bail!("destination differs from source at byte {first:#x}");
    }
    info!("memcpy: destination matches source");
    Ok(())
}

pub fn kcap_parse(kcap: &Kcap, memory: &dyn DmaAllocator, caps: usize) -> Result<()> {
    if !kcap.is_supported() {
        bail!("capability parser DMA did not respond to the probe");
    }
    if caps > MAX_CAP_INDEX {
        bail!("at most {MAX_CAP_INDEX} capabilities fit in a map");
    }

    let map: Vec<CapIndex> = (0..MAX_CAP_INDEX)
        .map(|index| {
            let kcap = if index < caps { index as u16 + 1 } else { 0 };
            CapIndex::new(kcap, index as u32)
        })
        .collect();
    let src = memory.alloc(KCAP_MAP_SIZE, CachePolicy::Uncached)?;
    src.write(0, map.as_slice().as_bytes());

    let count = kcap
        .parse_kcap_map(src.phys_addr())
        .context("capability parse failed")?;
    info!(
        "kcap-parse: {count} valid of {} entries",
        kcap.total_kcap_count()
    );
    let parsed = kcap.parsed_caps(count);
    for entry in &parsed {
        info!("kcap {:#06x} badge {:#x}", entry.kcap, entry.badge);
    }

    if count != caps {
        bail!("expected {caps} valid capabilities, parser reported {count}");
    }
    for (index, entry) in parsed.iter().enumerate() {
        if entry.kcap != index as u32 + 1 {
            bail!("entry {index} carries kcap {:#x}", entry.kcap);
        }
    }
    Ok(())
}
