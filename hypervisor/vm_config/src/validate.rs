//! Resource conflict validation
//!
//! The single place that decides whether the partitions described by a
//! configuration are actually disjoint: guest memory, pass-through device
//! windows and interrupt ownership are checked across every VM pair.
//! Overlaps are only accepted when they are demonstrably intentional,
//! either through a common shared memory channel group or through the
//! explicit [`RegionFlags::ALLOW_SHARED`] declaration on both sides, and
//! every accepted overlap is reported back so callers can assert on it.
//!
//! [`RegionFlags::ALLOW_SHARED`]: crate::model::RegionFlags::ALLOW_SHARED

use crate::error::{ConfigError, MalformedDescriptor};
use crate::model::{IrqId, PlatformConfig, RegionFlags, ShmemId, VmDescriptor, VmId};
use crate::shmem::ChannelGroup;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cmp::{max, min};

/// First shared peripheral interrupt id. Ids below this are SGIs and PPIs,
/// which the GIC banks per core; they can be wired into every VM (the arch
/// timer PPI for example) and carry no cross-VM ownership.
pub const SPI_BASE: IrqId = 32;

/// One accepted, intentional overlap between two VMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedRange {
    pub vm_a: VmId,
    pub vm_b: VmId,
    pub base: u64,
    pub size: u64,
}

/// Every intentional aliasing the validator accepted.
///
/// Deliberate-contention configurations show up here instead of silently
/// passing; an isolation-critical caller asserts these lists are empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SharingReport {
    /// Accepted guest memory overlaps (both sides `ALLOW_SHARED`).
    pub mem: Vec<SharedRange>,
    /// Accepted device window overlaps at the host physical level.
    pub dev: Vec<SharedRange>,
}

/// One contiguous guest mapping of a VM: a memory region or an IPC window.
struct Mapping {
    base: u64,
    size: u64,
    shared: bool,
    /// Set when this mapping is an IPC channel window.
    link: Option<ShmemId>,
}

fn mappings(vm: &VmDescriptor) -> Vec<Mapping> {
    let mut out = Vec::with_capacity(vm.regions.len() + vm.ipcs.len());
    for region in &vm.regions {
        out.push(Mapping {
            base: region.base,
            size: region.size,
            shared: region.flags.contains(RegionFlags::ALLOW_SHARED),
            link: None,
        });
    }
    for ipc in &vm.ipcs {
        out.push(Mapping {
            base: ipc.base,
            size: ipc.size,
            shared: false,
            link: Some(ipc.shmem_id),
        });
    }
    out
}

/// Intersection of two ranges, if any. Range ends are known not to overflow
/// (checked during model construction).
fn overlap(a_base: u64, a_size: u64, b_base: u64, b_size: u64) -> Option<(u64, u64)> {
    let base = max(a_base, b_base);
    let end = min(a_base + a_size, b_base + b_size);
    (end > base).then(|| (base, end - base))
}

/// Run all pairwise resource conflict checks over a structurally sound
/// configuration.
///
/// `groups` is the channel group table produced by [`crate::shmem::link`];
/// it tells the memory overlap check which cross-VM aliasing is backed by a
/// shared segment.
pub fn validate(
    config: &PlatformConfig,
    groups: &[ChannelGroup],
) -> Result<SharingReport, ConfigError> {
    let mut report = SharingReport::default();

    for (id, vm) in config.vms() {
        check_placement(id, vm)?;
        check_self_overlap(id, vm)?;
    }

    check_memory(config, groups, &mut report)?;
    check_devices(config, &mut report)?;
    check_interrupts(config)?;

    if !report.mem.is_empty() || !report.dev.is_empty() {
        log::warn!(
            "configuration contains {} declared memory and {} declared device sharings",
            report.mem.len(),
            report.dev.len()
        );
    }

    Ok(report)
}

/// The entry point and the image must land inside the VM's own memory.
fn check_placement(id: VmId, vm: &VmDescriptor) -> Result<(), ConfigError> {
    if !vm.regions.iter().any(|r| r.contains(vm.entry)) {
        return Err(MalformedDescriptor::EntryOutsideMemory {
            vm: id,
            entry: vm.entry,
        }
        .into());
    }

    let image_end = vm.image.base_addr + vm.image.size;
    let fits = vm
        .regions
        .iter()
        .any(|r| vm.image.base_addr >= r.base && image_end <= r.base + r.size);
    if !fits {
        return Err(MalformedDescriptor::ImageOutsideMemory {
            vm: id,
            base: vm.image.base_addr,
            size: vm.image.size,
        }
        .into());
    }

    Ok(())
}

/// A VM must not alias itself: its regions and IPC windows are pairwise
/// disjoint.
fn check_self_overlap(id: VmId, vm: &VmDescriptor) -> Result<(), ConfigError> {
    let maps = mappings(vm);
    for (i, a) in maps.iter().enumerate() {
        for b in maps.iter().skip(i + 1) {
            if let Some((base, size)) = overlap(a.base, a.size, b.base, b.size) {
                return Err(ConfigError::MemoryOverlapConflict {
                    vm_a: id,
                    vm_b: id,
                    base,
                    size,
                });
            }
        }
    }
    Ok(())
}

fn check_memory(
    config: &PlatformConfig,
    groups: &[ChannelGroup],
    report: &mut SharingReport,
) -> Result<(), ConfigError> {
    let per_vm: Vec<(VmId, Vec<Mapping>)> =
        config.vms().map(|(id, vm)| (id, mappings(vm))).collect();

    for (i, (id_a, maps_a)) in per_vm.iter().enumerate() {
        for (id_b, maps_b) in per_vm.iter().skip(i + 1) {
            for a in maps_a {
                for b in maps_b {
                    let Some((base, size)) = overlap(a.base, a.size, b.base, b.size) else {
                        continue;
                    };

                    match (a.link, b.link) {
                        // Both sides are windows of the same channel group:
                        // this is the shared segment doing its job.
                        (Some(la), Some(lb)) if la == lb => {
                            debug_assert!(groups.iter().any(|g| g.shmem == la));
                        }
                        (None, None) if a.shared && b.shared => {
                            log::warn!(
                                "{id_a} and {id_b} declare shared memory at {base:#x}+{size:#x}"
                            );
                            report.mem.push(SharedRange {
                                vm_a: *id_a,
                                vm_b: *id_b,
                                base,
                                size,
                            });
                        }
                        _ => {
                            return Err(ConfigError::MemoryOverlapConflict {
                                vm_a: *id_a,
                                vm_b: *id_b,
                                base,
                                size,
                            });
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn check_devices(config: &PlatformConfig, report: &mut SharingReport) -> Result<(), ConfigError> {
    let vms: Vec<_> = config.vms().collect();

    for (i, (id_a, vm_a)) in vms.iter().enumerate() {
        for (id_b, vm_b) in vms.iter().skip(i + 1) {
            for dev_a in vm_a.devices.iter().filter_map(|d| d.mmio.as_ref()) {
                for dev_b in vm_b.devices.iter().filter_map(|d| d.mmio.as_ref()) {
                    let Some((base, size)) = overlap(dev_a.pa, dev_a.size, dev_b.pa, dev_b.size)
                    else {
                        continue;
                    };

                    let both_shared = dev_a.flags.contains(RegionFlags::ALLOW_SHARED)
                        && dev_b.flags.contains(RegionFlags::ALLOW_SHARED);
                    if !both_shared {
                        return Err(ConfigError::MemoryOverlapConflict {
                            vm_a: *id_a,
                            vm_b: *id_b,
                            base,
                            size,
                        });
                    }

                    log::warn!(
                        "{id_a} and {id_b} share pass-through device at {base:#x}+{size:#x}"
                    );
                    report.dev.push(SharedRange {
                        vm_a: *id_a,
                        vm_b: *id_b,
                        base,
                        size,
                    });
                }
            }
        }
    }

    Ok(())
}

fn check_interrupts(config: &PlatformConfig) -> Result<(), ConfigError> {
    // Pass-through device SPIs: exactly one owner across the whole
    // configuration, a VM may not even claim one twice.
    let mut device_spis: BTreeMap<IrqId, VmId> = BTreeMap::new();
    for (id, vm) in config.vms() {
        for dev in &vm.devices {
            for &irq in dev.interrupts.iter().filter(|&&irq| irq >= SPI_BASE) {
                if let Some(&owner) = device_spis.get(&irq) {
                    return Err(ConfigError::InterruptOwnershipConflict {
                        irq,
                        vm_a: owner,
                        vm_b: id,
                    });
                }
                device_spis.insert(irq, id);
            }
        }
    }

    // IPC notification SPIs: shared, but only among members of one channel
    // group, and never colliding with a pass-through SPI.
    let mut ipc_spis: BTreeMap<IrqId, (ShmemId, VmId)> = BTreeMap::new();
    for (id, vm) in config.vms() {
        for ipc in &vm.ipcs {
            for &irq in ipc.interrupts.iter().filter(|&&irq| irq >= SPI_BASE) {
                if let Some(&owner) = device_spis.get(&irq) {
                    return Err(ConfigError::InterruptOwnershipConflict {
                        irq,
                        vm_a: owner,
                        vm_b: id,
                    });
                }
                match ipc_spis.get(&irq) {
                    Some(&(group, first)) if group != ipc.shmem_id => {
                        return Err(ConfigError::InterruptOwnershipConflict {
                            irq,
                            vm_a: first,
                            vm_b: id,
                        });
                    }
                    Some(_) => {}
                    None => {
                        ipc_spis.insert(irq, (ipc.shmem_id, id));
                    }
                }
            }
        }
    }

    Ok(())
}
