// Licensed under the Apache-2.0 license

//! Register maps for the AMD/Xilinx AXI DMA engines and the GPIO block that
//! reports capability-parser results.
//!
//! Offsets are byte offsets from the device base address. Bitfields are
//! `tock-registers` definitions so that drivers and emulated peripherals share
//! a single description of every field.

#![no_std]

pub mod axicdma;
pub mod axidma;
pub mod axigpio;

use tock_registers::register_bitfields;

register_bitfields! {
    u32,
    // Status register layout shared by CDMASR, MM2S_DMASR and S2MM_DMASR.
    // The three interrupt bits are write-1-to-clear.
    pub DmaStatus [
        Halted OFFSET(0) NUMBITS(1) [],
        Idle OFFSET(1) NUMBITS(1) [],
        SgIncld OFFSET(3) NUMBITS(1) [],
        /// Internal error reported by the DataMover.
        DmaIntErr OFFSET(4) NUMBITS(1) [],
        /// AXI slave error response seen by the DataMover.
        DmaSlvErr OFFSET(5) NUMBITS(1) [],
        /// AXI decode error seen by the DataMover (invalid address).
        DmaDecErr OFFSET(6) NUMBITS(1) [],
        SgIntErr OFFSET(8) NUMBITS(1) [],
        SgSlvErr OFFSET(9) NUMBITS(1) [],
        SgDecErr OFFSET(10) NUMBITS(1) [],
        IocIrq OFFSET(12) NUMBITS(1) [],
        DlyIrq OFFSET(13) NUMBITS(1) [],
        ErrIrq OFFSET(14) NUMBITS(1) [],
        IrqThresholdSts OFFSET(16) NUMBITS(8) [],
        IrqDelaySts OFFSET(24) NUMBITS(8) [],
    ]
}
