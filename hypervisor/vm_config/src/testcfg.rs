//! Synthetic configurations shared by the unit tests.
//!
//! These are condensed from the benchmark and test setups the hypervisor
//! ships for qemu-aarch64-virt and the Raspberry Pi 4, with memory bases
//! spread out where the originals relied on cache coloring to keep
//! identically-addressed guests apart.

use crate::model::{
    ArchConfig, DeviceRegion, GicConfig, IpcChannel, MemRegion, MmioWindow, PlatformConfig,
    RegionFlags, SharedMemorySegment, ShmemId, VmDescriptor, VmImage,
};
use alloc::vec;
use alloc::vec::Vec;
use platform::{QEMU_AARCH64_VIRT, RPI4};

/// The arch timer PPI every guest gets.
const TIMER_IRQ: u32 = 27;

/// A single-core baremetal guest with one memory region and the timer.
pub(crate) fn baremetal_vm(base: u64, size: u64) -> VmDescriptor {
    VmDescriptor {
        name: "baremetal",
        image: VmImage {
            base_addr: base,
            load_addr: 0,
            size: 0x10000,
        },
        entry: base,
        cpu_num: 1,
        cpu_affinity: 0,
        colors: 0,
        regions: vec![MemRegion::new(base, size)],
        devices: vec![DeviceRegion::irq_only(vec![TIMER_IRQ])],
        ipcs: vec![],
        arch: ArchConfig {
            gic: GicConfig::v3(0xf9010000, 0xf9020000),
        },
    }
}

/// Two pinned guests with interleaved, disjoint color masks (the legacy
/// qemu two-task benchmark).
pub(crate) fn two_vm_disjoint() -> PlatformConfig {
    let mut vm0 = baremetal_vm(0x40000000, 0x08000000);
    vm0.name = "freertos0";
    vm0.colors = 0b0101010101010101;
    vm0.cpu_affinity = 0b0001;
    vm0.devices.push(DeviceRegion::passthrough(
        0x09000000, 0xff000000, 0x10000, vec![],
    ));

    let mut vm1 = baremetal_vm(0x48000000, 0x08000000);
    vm1.name = "freertos1";
    vm1.colors = 0b1010101010101010;
    vm1.cpu_affinity = 0b0010;

    PlatformConfig::new(vec![vm0, vm1], vec![], &QEMU_AARCH64_VIRT).unwrap()
}

/// Four guests all mapping one `0x10000` byte segment at `0x70000000`,
/// notified through SPI 52 (the shared-memory test setup).
pub(crate) fn shmem_quartet(channel_size: u64) -> PlatformConfig {
    let vms: Vec<VmDescriptor> = (0..4u64)
        .map(|i| {
            let mut vm = baremetal_vm(0x40000000 + i * 0x08000000, 0x04000000);
            vm.ipcs.push(IpcChannel {
                base: 0x70000000,
                size: channel_size,
                shmem_id: ShmemId::new(0),
                interrupts: vec![52],
            });
            vm
        })
        .collect();

    PlatformConfig::new(
        vms,
        vec![SharedMemorySegment { size: 0x10000 }],
        &QEMU_AARCH64_VIRT,
    )
    .unwrap()
}

/// One VM maps a segment at `0x70000000`; another claims plain memory over
/// the same range without any link.
pub(crate) fn region_against_channel() -> PlatformConfig {
    let mut vm0 = baremetal_vm(0x40000000, 0x04000000);
    vm0.ipcs.push(IpcChannel {
        base: 0x70000000,
        size: 0x10000,
        shmem_id: ShmemId::new(0),
        interrupts: vec![],
    });
    let mut vm1 = baremetal_vm(0x48000000, 0x04000000);
    vm1.regions.push(MemRegion::new(0x70000000, 0x10000));

    PlatformConfig::new(
        vec![vm0, vm1],
        vec![SharedMemorySegment { size: 0x10000 }],
        &QEMU_AARCH64_VIRT,
    )
    .unwrap()
}

/// The rpi4 interference benchmark: a pinned freertos guest in the lower
/// color half and three baremetal aggressors aliasing the upper half plus
/// the same UART window at `0xfe215000`.
///
/// `declare_sharing` controls whether the aggressors carry the
/// [`RegionFlags::ALLOW_SHARED`] declaration on that window.
pub(crate) fn interference_quartet(declare_sharing: bool) -> PlatformConfig {
    let flags = if declare_sharing {
        RegionFlags::ALLOW_SHARED
    } else {
        RegionFlags::empty()
    };

    let mut vm0 = baremetal_vm(0x0, 0x00200000);
    vm0.name = "freertos";
    vm0.colors = 0b0000000011111111;
    vm0.cpu_affinity = 0b0001;
    vm0.arch.gic = GicConfig::v2(0xf9010000, 0xf9020000);

    let mut vms = vec![vm0];
    for i in 0..3u64 {
        let base = 0x00200000 + i * 0x04000000;
        let mut vm = baremetal_vm(base, 0x04000000);
        vm.colors = 0b1111111100000000;
        vm.arch.gic = GicConfig::v2(0xff841000, 0xff842000);
        vm.devices.push(DeviceRegion {
            mmio: Some(MmioWindow {
                pa: 0xfe215000,
                va: 0xff000000,
                size: 0x10000,
                flags,
            }),
            interrupts: vec![],
        });
        vms.push(vm);
    }

    PlatformConfig::new(vms, vec![], &RPI4).unwrap()
}
