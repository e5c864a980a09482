//! Static hardware geometry descriptions
//!
//! A [`Platform`] captures the fixed facts about a board that partition
//! configurations are validated against: how many physical cores exist, the
//! stage-2 page granule, how many cache partition units ("colors") the last
//! level cache can be split into, and how many interrupt lines the interrupt
//! controller wires up.
//!
//! These values are properties of the hardware, never of a configuration, so
//! they live in their own crate and are passed by reference into everything
//! that needs them.
#![no_std]

/// Fixed hardware geometry of one supported board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Human readable board name, used in diagnostics only.
    pub name: &'static str,
    /// Number of physical cores available for VM assignment.
    pub cpu_num: u32,
    /// Stage-2 translation granule in bytes. All region addresses and sizes
    /// in a configuration must be aligned to this.
    pub page_size: u64,
    /// Number of cache partition units the last level cache supports.
    /// A VM color mask may only set bits below this index.
    pub color_num: u32,
    /// One past the highest interrupt id the interrupt controller can route.
    pub irq_num: u32,
}

impl Platform {
    /// Bitmask with one bit set per physical core.
    pub const fn cpu_mask(&self) -> u64 {
        (1 << self.cpu_num) - 1
    }

    /// Bitmask with one bit set per cache partition unit.
    pub const fn color_mask(&self) -> u64 {
        (1 << self.color_num) - 1
    }

    /// Whether `value` is aligned to the stage-2 page granule.
    pub const fn is_page_aligned(&self, value: u64) -> bool {
        value % self.page_size == 0
    }
}

/// The qemu `virt` machine for aarch64 as used by the benchmark setups.
///
/// GICv3 with the distributor at `0x08000000` and redistributor frames from
/// `0x080A0000`; the 16 color units correspond to the emulated 16-way LLC.
pub const QEMU_AARCH64_VIRT: Platform = Platform {
    name: "qemu-aarch64-virt",
    cpu_num: 4,
    page_size: 0x1000,
    color_num: 16,
    irq_num: 1024,
};

/// Raspberry Pi 4 (BCM2711).
///
/// Four Cortex-A72 cores behind a GIC-400 (GICv2, distributor `0xff841000`,
/// cpu interface `0xff842000`). The 1 MiB 16-way LLC yields 16 usable page
/// colors.
pub const RPI4: Platform = Platform {
    name: "rpi4",
    cpu_num: 4,
    page_size: 0x1000,
    color_num: 16,
    irq_num: 256,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_mask_covers_all_cores() {
        assert_eq!(QEMU_AARCH64_VIRT.cpu_mask(), 0b1111);
        assert_eq!(RPI4.cpu_mask(), 0b1111);
    }

    #[test]
    fn color_mask_covers_all_units() {
        assert_eq!(QEMU_AARCH64_VIRT.color_mask(), 0xffff);
    }

    #[test]
    fn page_alignment() {
        assert!(RPI4.is_page_aligned(0xfe215000));
        assert!(!RPI4.is_page_aligned(0xfe215004));
    }
}
