// Licensed under the Apache-2.0 license.

//! Transfer sequencing and completion handling shared by the drivers.

use dma_registers::axicdma::bits::{AxicdmaBytesToTransfer, AxicdmaControl};
use dma_registers::DmaStatus;
use log::{debug, error};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::LocalRegisterCopy;

use crate::descriptor::DescriptorRing;
use crate::error::DmaError;
use crate::hil::Completion;
use crate::regs::{Axicdma, BusRegister};

/// Lifecycle of the most recent transfer on an engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    #[default]
    Idle,
    Configuring,
    Running,
    Completed,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Simple,
    ScatterGather,
}

/// Why a transfer did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    DataMoverInternal,
    Slave,
    Decode,
    /// Error interrupt with no error cause latched.
    Unidentified,
    /// Interrupt with neither completion nor error status.
    UnknownSource,
}

impl Fault {
    pub fn message(&self) -> &'static str {
        match self {
            Fault::DataMoverInternal => "DMA internal error",
            Fault::Slave => "AXI slave error",
            Fault::Decode => "AXI decode error: invalid physical address",
            Fault::Unidentified => "error interrupt without error cause",
            Fault::UnknownSource => "interrupt from unknown source",
        }
    }
}

impl From<Fault> for DmaError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::DataMoverInternal | Fault::Slave | Fault::Unidentified => {
                DmaError::InternalError
            }
            Fault::Decode => DmaError::InvalidAddress,
            Fault::UnknownSource => DmaError::ProtocolViolation,
        }
    }
}

/// Decide the outcome of a transfer from the status register captured after
/// its interrupt.
///
/// Completion wins over error. Error causes are ranked internal, slave,
/// decode; in scatter-gather mode the descriptor-fetch causes count as well.
pub fn classify(
    status: LocalRegisterCopy<u32, DmaStatus::Register>,
    mode: TransferMode,
) -> Result<(), Fault> {
    if status.is_set(DmaStatus::IocIrq) {
        return Ok(());
    }
    if !status.is_set(DmaStatus::ErrIrq) {
        return Err(Fault::UnknownSource);
    }

    let sg = mode == TransferMode::ScatterGather;
    if status.is_set(DmaStatus::DmaIntErr) || (sg && status.is_set(DmaStatus::SgIntErr)) {
        Err(Fault::DataMoverInternal)
    } else if status.is_set(DmaStatus::DmaSlvErr) || (sg && status.is_set(DmaStatus::SgSlvErr)) {
        Err(Fault::Slave)
    } else if status.is_set(DmaStatus::DmaDecErr) || (sg && status.is_set(DmaStatus::SgDecErr)) {
        Err(Fault::Decode)
    } else {
        Err(Fault::Unidentified)
    }
}

/// Block until the running transfer signals, clear the interrupt source and
/// re-arm the interrupt channel.
pub fn await_completion(
    label: &str,
    status: &BusRegister<'_, DmaStatus::Register>,
    irq: &dyn Completion,
    mode: TransferMode,
) -> Result<(), DmaError> {
    irq.wait()?;
    let snapshot = status.extract();
    let outcome = classify(snapshot, mode);

    // Status interrupt bits are write-1-to-clear.
    if snapshot.is_set(DmaStatus::IocIrq) {
        status.write(DmaStatus::IocIrq::SET);
    } else if snapshot.is_set(DmaStatus::ErrIrq) {
        status.write(DmaStatus::ErrIrq::SET);
    }
    irq.acknowledge()?;

    outcome.map_err(|fault| {
        error!("{label}: {} (status {:#010x})", fault.message(), snapshot.get());
        fault.into()
    })
}

/// Sequencer of the AXI CDMA. Callers serialize access.
pub struct TransferEngine {
    ring: DescriptorRing,
    state: TransferState,
}

impl TransferEngine {
    pub fn new(ring: DescriptorRing) -> Self {
        TransferEngine {
            ring,
            state: TransferState::Idle,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn ring(&self) -> &DescriptorRing {
        &self.ring
    }

    /// Copy `btt` bytes with a single register-programmed transfer.
    pub fn run_simple(
        &mut self,
        regs: &Axicdma<'_>,
        irq: &dyn Completion,
        dst: u64,
        src: u64,
        btt: u32,
    ) -> Result<(), DmaError> {
        self.state = TransferState::Configuring;
        regs.reset();
        regs.control()
            .modify(AxicdmaControl::IocIrqEn::SET + AxicdmaControl::ErrIrqEn::SET);
        regs.set_src_addr(src);
        regs.set_dst_addr(dst);

        self.state = TransferState::Running;
        regs.bytes_to_transfer()
            .write(AxicdmaBytesToTransfer::Btt.val(btt));

        self.finish(
            "CDMA",
            await_completion("CDMA", &regs.status(), irq, TransferMode::Simple),
            regs,
        )
    }

    /// Copy `total` bytes with one descriptor chain of at most `max_btt`
    /// bytes per descriptor.
    ///
    /// # Panics
    ///
    /// The chain must fit the descriptor storage and the 8-bit interrupt
    /// threshold.
    pub fn run_scatter_gather(
        &mut self,
        regs: &Axicdma<'_>,
        irq: &dyn Completion,
        dst: u64,
        src: u64,
        total: usize,
        max_btt: u32,
    ) -> Result<(), DmaError> {
        self.state = TransferState::Configuring;
        let chain = self.ring.build_chain(dst, src, total, max_btt);
        assert!(chain.count <= IRQ_THRESHOLD_MAX);
        debug!(
            "CDMA: chain of {} descriptors, head {:#x} tail {:#x}",
            chain.count, chain.head, chain.tail
        );

        regs.control().modify(
            AxicdmaControl::IocIrqEn::SET
                + AxicdmaControl::ErrIrqEn::SET
                + AxicdmaControl::IrqThreshold.val(chain.count as u32),
        );
        // Toggling SG mode re-initializes the descriptor fetch engine.
        regs.control().modify(AxicdmaControl::SgMode::CLEAR);
        regs.control().modify(AxicdmaControl::SgMode::SET);
        regs.set_current_descriptor(chain.head);

        self.state = TransferState::Running;
        regs.set_tail_descriptor(chain.tail);

        let result = await_completion("CDMA", &regs.status(), irq, TransferMode::ScatterGather);
        if result.is_err() {
            self.ring.dump_chain(&chain);
        }
        self.finish("CDMA", result, regs)
    }

    fn finish(
        &mut self,
        label: &str,
        result: Result<(), DmaError>,
        regs: &Axicdma<'_>,
    ) -> Result<(), DmaError> {
        match result {
            Ok(()) => self.state = TransferState::Completed,
            Err(err) => {
                self.state = TransferState::Faulted;
                debug!("{label}: register state after {err:?}");
                regs.dump_registers();
            }
        }
        result
    }
}

/// Largest value the 8-bit interrupt threshold field can hold.
pub const IRQ_THRESHOLD_MAX: usize = 0xff;

#[cfg(test)]
mod test {
    use super::*;
    use tock_registers::fields::FieldValue;

    fn status(value: FieldValue<u32, DmaStatus::Register>) -> LocalRegisterCopy<u32, DmaStatus::Register> {
        let mut copy = LocalRegisterCopy::new(0);
        copy.modify(value);
        copy
    }

    #[test]
    fn test_completion_wins_over_error() {
        let both = status(DmaStatus::IocIrq::SET + DmaStatus::ErrIrq::SET + DmaStatus::DmaDecErr::SET);
        assert_eq!(classify(both, TransferMode::Simple), Ok(()));
    }

    #[test]
    fn test_error_cause_priority() {
        let all = status(
            DmaStatus::ErrIrq::SET
                + DmaStatus::DmaIntErr::SET
                + DmaStatus::DmaSlvErr::SET
                + DmaStatus::DmaDecErr::SET,
        );
        assert_eq!(classify(all, TransferMode::Simple), Err(Fault::DataMoverInternal));

        let slave_decode =
            status(DmaStatus::ErrIrq::SET + DmaStatus::DmaSlvErr::SET + DmaStatus::DmaDecErr::SET);
        assert_eq!(classify(slave_decode, TransferMode::Simple), Err(Fault::Slave));

        let decode = status(DmaStatus::ErrIrq::SET + DmaStatus::DmaDecErr::SET);
        assert_eq!(classify(decode, TransferMode::Simple), Err(Fault::Decode));
    }

    #[test]
    fn test_sg_causes_only_count_in_sg_mode() {
        let sg_decode = status(DmaStatus::ErrIrq::SET + DmaStatus::SgDecErr::SET);
        assert_eq!(classify(sg_decode, TransferMode::ScatterGather), Err(Fault::Decode));
        assert_eq!(classify(sg_decode, TransferMode::Simple), Err(Fault::Unidentified));
    }

    #[test]
    fn test_no_status_is_unknown_source() {
        let idle = status(DmaStatus::Idle::SET);
        assert_eq!(classify(idle, TransferMode::Simple), Err(Fault::UnknownSource));
    }

    #[test]
    fn test_fault_maps_to_error_kind() {
        assert_eq!(DmaError::from(Fault::Slave), DmaError::InternalError);
        assert_eq!(DmaError::from(Fault::Unidentified), DmaError::InternalError);
        assert_eq!(DmaError::from(Fault::Decode), DmaError::InvalidAddress);
        assert_eq!(DmaError::from(Fault::UnknownSource), DmaError::ProtocolViolation);
    }
}
