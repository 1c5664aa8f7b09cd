// Licensed under the Apache-2.0 license

//! AXI DMA register map: a memory-map-to-stream (MM2S) channel and a
//! stream-to-memory-map (S2MM) channel sharing one register window.
//! Reference: https://docs.amd.com/r/en-US/pg021_axi_dma

pub use crate::DmaStatus as AxidmaStatus;

pub const AXIDMA_SIZE: usize = 0x5c;

pub mod regs {
    pub const MM2S_CONTROL: usize = 0x00;
    pub const MM2S_STATUS: usize = 0x04;
    pub const MM2S_SRC_ADDR: usize = 0x18;
    pub const MM2S_SRC_ADDR_MSB: usize = 0x1c;
    pub const MM2S_LENGTH: usize = 0x28;
    pub const S2MM_CONTROL: usize = 0x30;
    pub const S2MM_STATUS: usize = 0x34;
    pub const S2MM_DST_ADDR: usize = 0x48;
    pub const S2MM_DST_ADDR_MSB: usize = 0x4c;
    pub const S2MM_LENGTH: usize = 0x58;
}

pub mod bits {
    use tock_registers::register_bitfields;

    register_bitfields! {
        u32,
        // Layout of both MM2S_DMACR and S2MM_DMACR.
        pub AxidmaControl [
            RunStop OFFSET(0) NUMBITS(1) [],
            /// Soft reset of the whole engine, self-clearing.
            Reset OFFSET(2) NUMBITS(1) [],
            Keyhole OFFSET(3) NUMBITS(1) [],
            CyclicBdEnable OFFSET(4) NUMBITS(1) [],
            IocIrqEn OFFSET(12) NUMBITS(1) [],
            DlyIrqEn OFFSET(13) NUMBITS(1) [],
            ErrIrqEn OFFSET(14) NUMBITS(1) [],
            IrqThreshold OFFSET(16) NUMBITS(8) [],
            IrqDelay OFFSET(24) NUMBITS(8) [],
        ],
        pub AxidmaLength [
            Length OFFSET(0) NUMBITS(26) [],
        ],
    }
}
