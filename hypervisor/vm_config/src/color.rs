//! Cache color partition planning
//!
//! Reconciles every VM's color bitmask against the platform's cache
//! geometry and computes, for each pair of VMs that can run concurrently,
//! the cache partition units they would contend on. Contention is never an
//! error here: several benchmark configurations alias colors on purpose to
//! study interference. The planner's job is to make every intersection
//! visible so the caller can assert isolation where it is required.

use crate::model::{PlatformConfig, VmId};
use alloc::vec::Vec;
use platform::Platform;

/// The color relationship of one unordered VM pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorShare {
    pub a: VmId,
    pub b: VmId,
    /// Whether the two VMs' affinity sets intersect, i.e. the pair can
    /// execute concurrently on cores sharing the cache.
    pub co_scheduled: bool,
    /// Intersection of the pair's effective color masks.
    pub shared: u64,
}

impl ColorShare {
    /// A contention domain: concurrently runnable VMs with common colors.
    pub fn contended(&self) -> bool {
        self.co_scheduled && self.shared != 0
    }
}

/// The complete pairwise color intersection table.
///
/// Symmetric by construction: entries are stored for `a < b` and
/// [`ColorPlan::shared_between`] accepts either argument order. There is no
/// entry for a VM against itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPlan {
    pairs: Vec<ColorShare>,
}

impl ColorPlan {
    pub fn pairs(&self) -> &[ColorShare] {
        &self.pairs
    }

    /// The entry for an unordered VM pair; `None` when `a == b`.
    pub fn shared_between(&self, a: VmId, b: VmId) -> Option<&ColorShare> {
        if a == b {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.pairs.iter().find(|p| p.a == lo && p.b == hi)
    }

    /// All pairs forming a contention domain.
    pub fn contentions(&self) -> impl Iterator<Item = &ColorShare> {
        self.pairs.iter().filter(|p| p.contended())
    }
}

/// The color set a VM effectively occupies: its mask, or every unit when it
/// is unpartitioned (zero mask).
fn effective_colors(colors: u64, platform: &Platform) -> u64 {
    if colors == 0 {
        platform.color_mask()
    } else {
        colors
    }
}

/// The cores a VM can run on: its affinity mask, or every core when
/// unrestricted.
fn effective_affinity(affinity: u64, platform: &Platform) -> u64 {
    if affinity == 0 {
        platform.cpu_mask()
    } else {
        affinity
    }
}

/// Compute the pairwise color intersection table.
pub fn plan(config: &PlatformConfig, platform: &Platform) -> ColorPlan {
    let vms: Vec<_> = config
        .vms()
        .map(|(id, vm)| {
            (
                id,
                effective_colors(vm.colors, platform),
                effective_affinity(vm.cpu_affinity, platform),
            )
        })
        .collect();

    let mut pairs = Vec::new();
    for (i, &(id_a, colors_a, aff_a)) in vms.iter().enumerate() {
        for &(id_b, colors_b, aff_b) in vms.iter().skip(i + 1) {
            let share = ColorShare {
                a: id_a,
                b: id_b,
                co_scheduled: aff_a & aff_b != 0,
                shared: colors_a & colors_b,
            };
            if share.contended() {
                log::warn!(
                    "{id_a} and {id_b} contend on cache colors {:#b}",
                    share.shared
                );
            }
            pairs.push(share);
        }
    }

    ColorPlan { pairs }
}
