// Licensed under the Apache-2.0 license.

//! Drivers for two memory-mapped AXI DMA engines:
//!
//! * [`AxiCdma`], a central DMA used for hardware memory copies in simple or
//!   scatter-gather mode, with transparent splitting of large copies.
//! * [`Kcap`], an MM2S/S2MM DMA pair feeding the hardware capability parser.
//!
//! The drivers reach the hardware only through the traits in [`hil`].

pub mod axicdma;
pub mod buffer;
pub mod completion;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod hil;
pub mod kcap;
pub mod regs;
#[cfg(feature = "uio")]
pub mod uio;

pub use axicdma::AxiCdma;
pub use buffer::{CachePolicy, PhysicalBuffer};
pub use completion::{IrqChannel, IrqLine};
pub use engine::TransferState;
pub use error::DmaError;
pub use hil::{CapParser, Completion, DmaAllocator, DmaRegion, MemCopy, RegisterBus};
pub use kcap::{Kcap, ParsedCapIndex};
