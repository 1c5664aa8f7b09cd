// Licensed under the Apache-2.0 license

//! AXI Central DMA (CDMA) register map.
//! Reference: https://docs.amd.com/r/en-US/pg034-axi-cdma

pub use crate::DmaStatus as AxicdmaStatus;

/// Size of the register window.
pub const AXICDMA_SIZE: usize = 0x2c;

pub mod regs {
    pub const CONTROL: usize = 0x00;
    pub const STATUS: usize = 0x04;
    pub const CURDESC: usize = 0x08;
    pub const CURDESC_MSB: usize = 0x0c;
    pub const TAILDESC: usize = 0x10;
    pub const TAILDESC_MSB: usize = 0x14;
    pub const SRC_ADDR: usize = 0x18;
    pub const SRC_ADDR_MSB: usize = 0x1c;
    pub const DST_ADDR: usize = 0x20;
    pub const DST_ADDR_MSB: usize = 0x24;
    pub const BYTES_TO_TRANSFER: usize = 0x28;
}

pub mod bits {
    use tock_registers::register_bitfields;

    register_bitfields! {
        u32,
        pub AxicdmaControl [
            TailPntrEn OFFSET(1) NUMBITS(1) [],
            /// Soft reset, self-clearing.
            Reset OFFSET(2) NUMBITS(1) [],
            SgMode OFFSET(3) NUMBITS(1) [],
            KeyHoleRead OFFSET(4) NUMBITS(1) [],
            KeyHoleWrite OFFSET(5) NUMBITS(1) [],
            CyclicBdEnable OFFSET(6) NUMBITS(1) [],
            IocIrqEn OFFSET(12) NUMBITS(1) [],
            DlyIrqEn OFFSET(13) NUMBITS(1) [],
            ErrIrqEn OFFSET(14) NUMBITS(1) [],
            /// Number of completed descriptors before IOC fires. 0 is ignored.
            IrqThreshold OFFSET(16) NUMBITS(8) [],
            IrqDelay OFFSET(24) NUMBITS(8) [],
        ],
        pub AxicdmaBytesToTransfer [
            Btt OFFSET(0) NUMBITS(26) [],
        ],
        // CONTROL word of a scatter-gather transfer descriptor.
        pub TdControl [
            Btt OFFSET(0) NUMBITS(26) [],
        ],
        // STATUS word of a scatter-gather transfer descriptor, written by hardware.
        pub TdStatus [
            DmaIntErr OFFSET(28) NUMBITS(1) [],
            DmaSlvErr OFFSET(29) NUMBITS(1) [],
            DmaDecErr OFFSET(30) NUMBITS(1) [],
            Cmplt OFFSET(31) NUMBITS(1) [],
        ],
    }
}
