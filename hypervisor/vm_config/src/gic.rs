//! Interrupt and virtual GIC routing tables
//!
//! Elects the GIC model every guest sees (v2 cpu-interface vs v3
//! redistributor, selected by which address the descriptor sets) and builds
//! the authoritative physical-SPI routing table the interrupt controller
//! driver programs from: pass-through SPIs route to their single owning VM,
//! IPC notification SPIs fan out to all members of their channel group.

use crate::error::ConfigError;
use crate::model::{IrqId, PlatformConfig, ShmemId, VmId};
use crate::shmem::ChannelGroup;
use crate::validate::SPI_BASE;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// The interrupt controller windows one guest is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicModel {
    /// GICv2: distributor plus cpu interface.
    V2 { gicd: u64, gicc: u64 },
    /// GICv3 or later: distributor plus redistributor frames.
    V3 { gicd: u64, gicr: u64 },
}

impl GicModel {
    /// Distance from the distributor to the per-cpu window. VMs sharing a
    /// model are expected to keep this layout identical.
    fn interface_offset(&self) -> i128 {
        match *self {
            GicModel::V2 { gicd, gicc } => gicc as i128 - gicd as i128,
            GicModel::V3 { gicd, gicr } => gicr as i128 - gicd as i128,
        }
    }

    fn is_v2(&self) -> bool {
        matches!(self, GicModel::V2 { .. })
    }
}

/// The virtual GIC layout of one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmGic {
    pub vm: VmId,
    pub model: GicModel,
}

/// Where one physical SPI is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrqRoute {
    /// Pass-through device interrupt, owned by exactly one VM.
    Device(VmId),
    /// Channel notification interrupt, delivered to every listed member of
    /// the group.
    Ipc(ShmemId, Vec<VmId>),
}

/// The complete interrupt routing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqPlan {
    /// `physical SPI -> route`. SGIs and PPIs are banked per core and have
    /// no global routing entry.
    pub spis: BTreeMap<IrqId, IrqRoute>,
    /// Per-VM virtual GIC layout, in [`VmId`] order.
    pub vgics: Vec<VmGic>,
}

impl IrqPlan {
    pub fn owner(&self, irq: IrqId) -> Option<&IrqRoute> {
        self.spis.get(&irq)
    }

    pub fn vgic(&self, vm: VmId) -> &GicModel {
        &self.vgics[vm.index()].model
    }
}

/// Build the routing table over a conflict-validated configuration.
pub fn build(config: &PlatformConfig, groups: &[ChannelGroup]) -> Result<IrqPlan, ConfigError> {
    let mut vgics = Vec::with_capacity(config.vm_count());
    for (id, vm) in config.vms() {
        let gic = &vm.arch.gic;
        let model = match (gic.gicc_addr, gic.gicr_addr) {
            (Some(gicc), None) => GicModel::V2 {
                gicd: gic.gicd_addr,
                gicc,
            },
            (None, Some(gicr)) => GicModel::V3 {
                gicd: gic.gicd_addr,
                gicr,
            },
            _ => return Err(ConfigError::AmbiguousGicVersion { vm: id }),
        };
        vgics.push(VmGic { vm: id, model });
    }

    // Guests sharing a model should agree on the distributor-to-interface
    // distance; shipped configurations are known to diverge here, so this
    // is surfaced but accepted.
    for model_v2 in [true, false] {
        let mut offsets = vgics
            .iter()
            .filter(|g| g.model.is_v2() == model_v2)
            .map(|g| (g.vm, g.model.interface_offset()));
        if let Some((first_vm, first)) = offsets.next() {
            for (vm, offset) in offsets {
                if offset != first {
                    log::warn!(
                        "{vm} lays out its virtual GIC differently from {first_vm} \
                         (interface offset {offset:#x} vs {first:#x})"
                    );
                }
            }
        }
    }

    let mut spis: BTreeMap<IrqId, IrqRoute> = BTreeMap::new();
    for (id, vm) in config.vms() {
        for dev in &vm.devices {
            for &irq in dev.interrupts.iter().filter(|&&irq| irq >= SPI_BASE) {
                spis.insert(irq, IrqRoute::Device(id));
            }
        }
    }
    for group in groups {
        for member in &group.members {
            for &irq in member.interrupts.iter().filter(|&&irq| irq >= SPI_BASE) {
                match spis.get_mut(&irq) {
                    Some(IrqRoute::Ipc(_, vms)) => {
                        if !vms.contains(&member.vm) {
                            vms.push(member.vm);
                        }
                    }
                    _ => {
                        spis.insert(irq, IrqRoute::Ipc(group.shmem, alloc::vec![member.vm]));
                    }
                }
            }
        }
    }

    Ok(IrqPlan { spis, vgics })
}
