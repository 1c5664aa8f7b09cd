// Licensed under the Apache-2.0 license

//! Software models of the AXI DMA hardware driven by `dma-driver`.

mod axicdma;
mod axidma;
mod ram;

pub use axicdma::{AxiCdma, Fault, RegisterWrite, Segment};
pub use axidma::{AxiDma, AxiGpio, Direction};
pub use ram::{DmaOpError, Ram};

/// A 64-bit bus address held in an LSB/MSB register pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AxiAddr {
    pub lo: u32,
    pub hi: u32,
}

impl AxiAddr {
    pub fn get(&self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }
}

impl From<u64> for AxiAddr {
    fn from(addr: u64) -> Self {
        AxiAddr {
            lo: addr as u32,
            hi: (addr >> 32) as u32,
        }
    }
}
