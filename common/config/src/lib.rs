// Licensed under the Apache-2.0 license

//! Board description for the DMA drivers: where each engine's registers
//! live, which interrupt and UIO node belong to it, and how transfers are
//! issued.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Largest byte count the CDMA BTT register accepts.
pub const MAX_BTT: u32 = 0x007f_ffff;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmaConfig {
    pub cdma: Option<CdmaConfig>,
    pub kcap: Option<KcapConfig>,
    pub memory: Option<MemoryConfig>,
}

/// AXI CDMA used for hardware memory copies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdmaConfig {
    /// Physical address of the register window.
    pub address: u64,
    pub irq: u32,
    /// UIO node exposing the registers and the interrupt.
    pub uio: Option<usize>,
    #[serde(default = "default_sg_enabled")]
    pub sg_enabled: bool,
    /// Override for hardware built with a narrower BTT register.
    pub max_btt: Option<u32>,
}

/// AXI DMA and GPIO block of the capability parser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KcapConfig {
    pub dma_address: u64,
    pub mm2s_irq: u32,
    pub s2mm_irq: u32,
    pub gpio_address: u64,
    /// UIO node exposing the DMA registers and the MM2S interrupt.
    pub mm2s_uio: Option<usize>,
    pub s2mm_uio: Option<usize>,
    pub gpio_uio: Option<usize>,
}

/// Reserved physical memory for DMA buffers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    pub uio: usize,
}

fn default_sg_enabled() -> bool {
    true
}

impl DmaConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: DmaConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max_btt) = self.cdma.as_ref().and_then(|cdma| cdma.max_btt) {
            if max_btt == 0 || max_btt > MAX_BTT {
                return Err(ConfigError::Invalid(format!(
                    "cdma.max_btt {max_btt:#x} outside 1..={MAX_BTT:#x}"
                )));
            }
        }
        Ok(())
    }
}
