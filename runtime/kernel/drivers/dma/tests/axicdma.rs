// Licensed under the Apache-2.0 license

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use common::{read_all, CdmaBench, RAM_BASE, RAM_SIZE};
use dma_driver::axicdma::MAX_CHAIN_LEN;
use dma_driver::descriptor::{TransferDescriptor, TD_SIZE};
use dma_driver::{AxiCdma, DmaError, IrqChannel, MemCopy, TransferState};
use dma_registers::axicdma::bits::TdStatus;
use dma_registers::axicdma::regs::*;
use emulator_periph::{Fault, Ram, Segment};
use rand::Rng;
use tock_registers::LocalRegisterCopy;
use zerocopy::{FromZeros, IntoBytes};

fn deadbeef(len: usize) -> Vec<u8> {
    0xdead_beef_u32
        .to_be_bytes()
        .into_iter()
        .cycle()
        .take(len)
        .collect()
}

fn read_descriptor(ram: &Ram, addr: u64) -> TransferDescriptor {
    let mut td = TransferDescriptor::new_zeroed();
    ram.read(addr, td.as_mut_bytes()).unwrap();
    td
}

#[test]
fn test_deadbeef_simple_mode() {
    let bench = CdmaBench::simple();
    let src = bench.alloc(24);
    let dst = bench.alloc(24);
    src.write(0, &deadbeef(24));

    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 24).unwrap();

    assert_eq!(read_all(&dst), deadbeef(24));
    assert_eq!(bench.device.starts(), 1);
    assert_eq!(bench.cdma.last_state(), TransferState::Completed);
}

#[test]
fn test_deadbeef_scatter_gather_three_descriptors() {
    let bench = CdmaBench::scatter_gather().with_max_btt(8);
    assert!(bench.cdma.is_sg_enabled());
    let src = bench.alloc(24);
    let dst = bench.alloc(24);
    src.write(0, &deadbeef(24));

    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 24).unwrap();
    assert_eq!(read_all(&dst), deadbeef(24));
    assert_eq!(bench.device.starts(), 1);

    // Descriptor storage is the first allocation; the newest descriptor heads the chain.
    let head = RAM_BASE + 2 * TD_SIZE as u64;
    let log = bench.device.write_log();
    let curdesc = log.iter().rposition(|write| write.offset == CURDESC).unwrap();
    let taildesc = log.iter().rposition(|write| write.offset == TAILDESC).unwrap();
    assert_eq!(u64::from(log[curdesc].value), head);
    assert_eq!(u64::from(log[taildesc].value), RAM_BASE);
    assert!(curdesc < taildesc);

    // Engine walked newest to oldest, each descriptor carrying 8 bytes.
    let segments = bench.device.segments();
    assert_eq!(segments.len(), 3);
    assert_eq!(
        segments[0],
        Segment {
            src: src.phys_addr() + 16,
            dst: dst.phys_addr() + 16,
            len: 8
        }
    );
    for index in 0..3 {
        let td = read_descriptor(&bench.ram, RAM_BASE + (index * TD_SIZE) as u64);
        assert_eq!(td.bytes_to_transfer(), 8);
        let status = LocalRegisterCopy::<u32, TdStatus::Register>::new(td.status);
        assert!(status.is_set(TdStatus::Cmplt));
    }
}

#[test]
fn test_simple_mode_register_sequence() {
    let bench = CdmaBench::simple();
    let (src, dst, _) = bench.buffers(16);
    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 16).unwrap();
    assert_eq!(
        bench.written_offsets(),
        vec![
            CONTROL,
            CONTROL,
            SRC_ADDR_MSB,
            SRC_ADDR,
            DST_ADDR_MSB,
            DST_ADDR,
            BYTES_TO_TRANSFER,
            STATUS
        ]
    );
}

#[test]
fn test_scatter_gather_register_sequence() {
    let bench = CdmaBench::scatter_gather();
    let (src, dst, _) = bench.buffers(16);
    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 16).unwrap();
    assert_eq!(
        bench.written_offsets(),
        vec![
            CONTROL,
            CONTROL,
            CONTROL,
            CURDESC_MSB,
            CURDESC,
            TAILDESC_MSB,
            TAILDESC,
            STATUS
        ]
    );
}

#[test]
fn test_simple_mode_chunks_at_max_btt() {
    let bench = CdmaBench::simple().with_max_btt(0x100);
    let len = 3 * 0x100 + 5;
    let (src, dst, data) = bench.buffers(len);

    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), len).unwrap();

    assert_eq!(read_all(&dst), data);
    let segments = bench.device.segments();
    let lens: Vec<usize> = segments.iter().map(|segment| segment.len).collect();
    assert_eq!(lens, vec![0x100, 0x100, 0x100, 5]);
    for (index, segment) in segments.iter().enumerate() {
        assert_eq!(segment.src, src.phys_addr() + (index * 0x100) as u64);
        assert_eq!(segment.dst, dst.phys_addr() + (index * 0x100) as u64);
    }
    let btt_writes = bench
        .written_offsets()
        .into_iter()
        .filter(|offset| *offset == BYTES_TO_TRANSFER)
        .count();
    assert_eq!(btt_writes, 4);
}

#[test]
fn test_scatter_gather_splits_long_chains() {
    let bench = CdmaBench::scatter_gather().with_max_btt(4);
    let len = 2 * MAX_CHAIN_LEN * 4 + 12;
    let (src, dst, data) = bench.buffers(len);

    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), len).unwrap();

    assert_eq!(read_all(&dst), data);
    assert_eq!(bench.device.starts(), 3);
    assert_eq!(bench.device.segments().len(), 2 * MAX_CHAIN_LEN + 3);
}

#[test]
fn test_round_trip_random_sizes() {
    let mut rng = rand::thread_rng();
    for bench in [
        CdmaBench::simple().with_max_btt(64),
        CdmaBench::scatter_gather().with_max_btt(64),
    ] {
        for _ in 0..16 {
            let len = rng.gen_range(1..=4 * 64 + 7);
            let (src, dst, data) = bench.buffers(len);
            bench.cdma.copy(dst.phys_addr(), src.phys_addr(), len).unwrap();
            assert_eq!(read_all(&dst), data);
        }
    }
}

#[test]
fn test_chunk_boundaries() {
    for (len, transfers) in [(16, 1), (17, 2), (32, 2)] {
        let bench = CdmaBench::simple().with_max_btt(16);
        let (src, dst, data) = bench.buffers(len);
        bench.cdma.copy(dst.phys_addr(), src.phys_addr(), len).unwrap();
        assert_eq!(read_all(&dst), data);

        let segments = bench.device.segments();
        assert_eq!(segments.len(), transfers);
        let mut next = 0;
        for segment in &segments {
            assert!(segment.len <= 16);
            assert_eq!(segment.src, src.phys_addr() + next as u64);
            assert_eq!(segment.dst, dst.phys_addr() + next as u64);
            next += segment.len;
        }
        assert_eq!(next, len);
    }
}

#[test]
fn test_exact_multiple_of_max_btt() {
    let bench = CdmaBench::simple().with_max_btt(16);
    let (src, dst, data) = bench.buffers(64);
    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 64).unwrap();
    assert_eq!(read_all(&dst), data);
    assert_eq!(bench.device.starts(), 4);
}

#[test]
fn test_zero_length_copy_touches_nothing() {
    let bench = CdmaBench::simple();
    bench.cdma.copy(RAM_BASE + 0x1000, RAM_BASE, 0).unwrap();
    assert!(bench.device.write_log().is_empty());
}

#[test]
fn test_fault_injection_maps_to_error_kinds() {
    for (fault, expected) in [
        (Fault::Internal, DmaError::InternalError),
        (Fault::Slave, DmaError::InternalError),
        (Fault::Decode, DmaError::InvalidAddress),
    ] {
        for bench in [CdmaBench::simple(), CdmaBench::scatter_gather()] {
            let (src, dst, _) = bench.buffers(32);
            bench.device.inject_fault(fault);
            assert_eq!(
                bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 32),
                Err(expected)
            );
            assert_eq!(bench.cdma.last_state(), TransferState::Faulted);
        }
    }
}

#[test]
fn test_address_outside_memory_is_decode_error() {
    let bench = CdmaBench::simple();
    let dst = bench.alloc(16);
    let src = RAM_BASE + RAM_SIZE as u64;
    assert_eq!(
        bench.cdma.copy(dst.phys_addr(), src, 16),
        Err(DmaError::InvalidAddress)
    );
}

#[test]
fn test_spurious_interrupt_is_protocol_violation() {
    let bench = CdmaBench::simple();
    let (src, dst, data) = bench.buffers(16);
    bench.device.inject_spurious_interrupt();
    assert_eq!(
        bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 16),
        Err(DmaError::ProtocolViolation)
    );

    // The channel is re-armed: the next copy goes through.
    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 16).unwrap();
    assert_eq!(read_all(&dst), data);
}

#[test]
fn test_recovers_after_error() {
    for bench in [CdmaBench::simple(), CdmaBench::scatter_gather()] {
        let (src, dst, data) = bench.buffers(48);
        bench.device.inject_fault(Fault::Decode);
        assert!(bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 48).is_err());

        bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 48).unwrap();
        assert_eq!(read_all(&dst), data);
        assert_eq!(bench.cdma.last_state(), TransferState::Completed);
    }
}

#[test]
fn test_first_failure_aborts_remaining_chunks() {
    let bench = CdmaBench::simple().with_max_btt(8);
    let (src, dst, _) = bench.buffers(24);
    bench.device.inject_fault(Fault::Internal);

    assert_eq!(
        bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 24),
        Err(DmaError::InternalError)
    );
    assert_eq!(bench.device.starts(), 1);
    assert!(bench.device.segments().is_empty());
    assert_eq!(read_all(&dst), vec![0; 24]);
}

#[test]
fn test_ranges_beyond_4gib_rejected_before_hardware() {
    let bench = CdmaBench::scatter_gather();
    let buffer = bench.alloc(0x20);
    for (dst, src) in [
        (0xffff_fff0, buffer.phys_addr()),
        (buffer.phys_addr(), 0xffff_fff0),
        (0x1_0000_0000, buffer.phys_addr()),
    ] {
        assert_eq!(bench.cdma.copy(dst, src, 0x20), Err(DmaError::InvalidAddress));
    }
    assert!(bench.device.write_log().is_empty());
}

#[test]
fn test_unresponsive_device_is_unsupported() {
    common::init_logger();
    let ram = Ram::new(RAM_BASE, RAM_SIZE);
    let irq = IrqChannel::new();
    let device = Arc::new(emulator_periph::AxiCdma::unresponsive(ram.clone(), irq.line()));
    let cdma = AxiCdma::new(device, irq, &ram, true).unwrap();

    assert!(!cdma.is_supported());
    assert_eq!(cdma.copy(RAM_BASE + 0x100, RAM_BASE, 4), Err(DmaError::Unsupported));
}

#[test]
fn test_falls_back_to_simple_without_sg_engine() {
    let bench = CdmaBench::new(false, true).with_max_btt(8);
    assert!(!bench.cdma.is_sg_enabled());

    let (src, dst, data) = bench.buffers(24);
    bench.cdma.copy(dst.phys_addr(), src.phys_addr(), 24).unwrap();
    assert_eq!(read_all(&dst), data);
    assert_eq!(bench.device.starts(), 3);
    assert!(!bench.written_offsets().contains(&TAILDESC));
}

#[test]
fn test_concurrent_copies_do_not_interleave() {
    let bench = CdmaBench::simple().with_max_btt(8);
    let (src_a, dst_a, data_a) = bench.buffers(64);
    let (src_b, dst_b, data_b) = bench.buffers(64);

    thread::scope(|scope| {
        scope.spawn(|| bench.cdma.copy(dst_a.phys_addr(), src_a.phys_addr(), 64).unwrap());
        scope.spawn(|| bench.cdma.copy(dst_b.phys_addr(), src_b.phys_addr(), 64).unwrap());
    });

    assert_eq!(read_all(&dst_a), data_a);
    assert_eq!(read_all(&dst_b), data_b);

    // All writes of one copy precede all writes of the other.
    let threads: Vec<_> = bench
        .device
        .write_log()
        .iter()
        .map(|write| write.thread)
        .collect();
    let switches = threads.windows(2).filter(|pair| pair[0] != pair[1]).count();
    assert_eq!(switches, 1);
    assert_eq!(threads.iter().collect::<HashSet<_>>().len(), 2);
}

#[test]
fn test_descriptor_storage_released_with_driver() {
    let bench = CdmaBench::scatter_gather();
    assert_eq!(bench.ram.live_allocations(), 1);
    let CdmaBench { ram, cdma, .. } = bench;
    drop(cdma);
    assert_eq!(ram.live_allocations(), 0);
}
