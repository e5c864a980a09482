//! CPU affinity resolution and core assignment
//!
//! Maps every VM's affinity bitmask onto the platform's physical cores and
//! decides which cores actually boot which VM. Assignment is a pure
//! function of the configuration: VMs are processed in id order and cores
//! are picked least-loaded-first (ties to the lowest index), so every core
//! computing the plan independently arrives at the same answer.

use crate::error::ConfigError;
use crate::model::{PlatformConfig, VmId};
use alloc::vec;
use alloc::vec::Vec;
use platform::Platform;

/// The physical cores one VM boots on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    pub vm: VmId,
    /// One bit per assigned physical core; `cpu_num` bits are set.
    pub cores: u64,
}

/// A core that ended up running more than one VM.
///
/// Time-multiplexing a core between partitions is legal when the operator
/// arranged for it (interference setups), so it is recorded rather than
/// rejected, mirroring the color contention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedCore {
    pub core: u32,
    pub vms: Vec<VmId>,
}

/// The per-core boot assignment for the whole configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityPlan {
    /// One entry per VM, in [`VmId`] order.
    pub assignments: Vec<CoreAssignment>,
    /// Cores carrying more than one VM, in core order.
    pub shared_cores: Vec<SharedCore>,
}

impl AffinityPlan {
    pub fn cores_of(&self, vm: VmId) -> u64 {
        self.assignments[vm.index()].cores
    }
}

/// Resolve every VM's affinity against the platform and emit the boot
/// assignment.
pub fn resolve(config: &PlatformConfig, platform: &Platform) -> Result<AffinityPlan, ConfigError> {
    // Range check before anything else is derived from the masks.
    for (id, vm) in config.vms() {
        if vm.cpu_affinity & !platform.cpu_mask() != 0 {
            return Err(ConfigError::AffinityOutOfRange {
                vm: id,
                mask: vm.cpu_affinity,
                cpu_num: platform.cpu_num,
            });
        }
    }

    // A singleton mask is an exclusive claim; two of those on one core can
    // never both hold.
    let mut exclusive: Vec<Option<VmId>> = vec![None; platform.cpu_num as usize];
    for (id, vm) in config.vms() {
        if vm.cpu_affinity.count_ones() == 1 {
            let core = vm.cpu_affinity.trailing_zeros();
            if let Some(owner) = exclusive[core as usize] {
                return Err(ConfigError::CoreOvercommitted {
                    core,
                    vm_a: owner,
                    vm_b: id,
                });
            }
            exclusive[core as usize] = Some(id);
        }
    }

    let mut load = vec![0u32; platform.cpu_num as usize];
    let mut assignments = Vec::with_capacity(config.vm_count());

    for (id, vm) in config.vms() {
        let eligible = if vm.cpu_affinity == 0 {
            platform.cpu_mask()
        } else {
            vm.cpu_affinity
        };

        let mut candidates: Vec<u32> = (0..platform.cpu_num)
            .filter(|&core| eligible & (1 << core) != 0)
            .collect();
        if (candidates.len() as u32) < vm.cpu_num {
            return Err(ConfigError::InsufficientCores {
                vm: id,
                want: vm.cpu_num,
                have: candidates.len() as u32,
            });
        }

        candidates.sort_by_key(|&core| (load[core as usize], core));

        let mut cores = 0u64;
        for &core in candidates.iter().take(vm.cpu_num as usize) {
            cores |= 1 << core;
            load[core as usize] += 1;
        }
        assignments.push(CoreAssignment { vm: id, cores });
    }

    let mut shared_cores = Vec::new();
    for core in 0..platform.cpu_num {
        let vms: Vec<VmId> = assignments
            .iter()
            .filter(|a| a.cores & (1 << core) != 0)
            .map(|a| a.vm)
            .collect();
        if vms.len() > 1 {
            log::warn!("core {core} is time-shared between {} VMs", vms.len());
            shared_cores.push(SharedCore { core, vms });
        }
    }

    Ok(AffinityPlan {
        assignments,
        shared_cores,
    })
}
