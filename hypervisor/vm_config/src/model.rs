//! Typed descriptor model of one full platform configuration
//!
//! A [`PlatformConfig`] is the root of everything this crate does: the
//! ordered list of VM descriptors plus the shared memory segments they may
//! reference. It is constructed exactly once from build-time data and never
//! mutated afterwards; [`PlatformConfig::new`] performs all structural
//! well-formedness checks so that every later pipeline stage can rely on a
//! sound shape and only concern itself with resource semantics.
//!
//! VMs and shared memory segments are addressed through the explicit
//! [`VmId`] / [`ShmemId`] handles assigned from list order at construction.
//! Every diagnostic and every output table speaks in these handles.

use crate::error::{ConfigError, MalformedDescriptor};
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;
use platform::Platform;

/// A physical interrupt line id as routed by the interrupt controller.
pub type IrqId = u32;

/// Stable handle of one VM within a [`PlatformConfig`].
///
/// Assigned from descriptor list order at construction and used everywhere
/// instead of raw positional indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmId(u16);

impl VmId {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm{}", self.0)
    }
}

/// Stable handle of one shared memory segment within a [`PlatformConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShmemId(u16);

impl ShmemId {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShmemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shmem{}", self.0)
    }
}

bitflags! {
    /// Per-region policy flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RegionFlags: u32 {
        /// This region may deliberately alias a region of another VM.
        ///
        /// Interference benchmarks map the same physical range into several
        /// VMs on purpose. Such an overlap is only accepted when *both*
        /// sides declare it; it is then recorded as a sharing fact instead
        /// of raising [`ConfigError::MemoryOverlapConflict`].
        const ALLOW_SHARED = 0b1;
    }
}

/// Placement of a VM's binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmImage {
    /// Guest physical address the image is copied to before the VM starts.
    pub base_addr: u64,
    /// Offset of the image within the packaged hypervisor binary.
    pub load_addr: u64,
    /// Image size in bytes.
    pub size: u64,
}

/// One guest physical memory region granted to a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub base: u64,
    pub size: u64,
    pub flags: RegionFlags,
}

impl MemRegion {
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            flags: RegionFlags::empty(),
        }
    }

    pub const fn shared(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            flags: RegionFlags::ALLOW_SHARED,
        }
    }

    /// Whether `addr` falls inside this region.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// The memory-mapped window of a pass-through device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioWindow {
    /// Host physical address of the device registers.
    pub pa: u64,
    /// Guest address the window is visible at.
    pub va: u64,
    pub size: u64,
    pub flags: RegionFlags,
}

/// One pass-through device granted to a VM.
///
/// An entry may be interrupt-only (no window), e.g. the per-core arch timer
/// which has no registers of its own but delivers a PPI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegion {
    pub mmio: Option<MmioWindow>,
    /// Physical interrupt ids routed through to this VM.
    pub interrupts: Vec<IrqId>,
}

impl DeviceRegion {
    pub fn passthrough(pa: u64, va: u64, size: u64, interrupts: Vec<IrqId>) -> Self {
        Self {
            mmio: Some(MmioWindow {
                pa,
                va,
                size,
                flags: RegionFlags::empty(),
            }),
            interrupts,
        }
    }

    pub fn irq_only(interrupts: Vec<IrqId>) -> Self {
        Self {
            mmio: None,
            interrupts,
        }
    }
}

/// One end of an inter-VM shared memory channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcChannel {
    /// Guest address this VM maps the segment at.
    pub base: u64,
    /// Mapped size; must not exceed the referenced segment's size.
    pub size: u64,
    /// The backing segment in [`PlatformConfig::segments`].
    pub shmem_id: ShmemId,
    /// Notification interrupts delivered to this VM for the channel.
    pub interrupts: Vec<IrqId>,
}

/// A shared memory segment backing one channel group.
///
/// Segments carry no address; each mapping VM chooses its own guest base
/// through its [`IpcChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMemorySegment {
    pub size: u64,
}

/// Interrupt controller windows exposed to one guest.
///
/// Exactly one of `gicc_addr` (GICv2 cpu interface) and `gicr_addr` (GICv3
/// redistributor) must be set; which one selects the GIC model the guest
/// sees. This is enforced by the routing table builder, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicConfig {
    pub gicd_addr: u64,
    pub gicc_addr: Option<u64>,
    pub gicr_addr: Option<u64>,
}

impl GicConfig {
    pub const fn v2(gicd_addr: u64, gicc_addr: u64) -> Self {
        Self {
            gicd_addr,
            gicc_addr: Some(gicc_addr),
            gicr_addr: None,
        }
    }

    pub const fn v3(gicd_addr: u64, gicr_addr: u64) -> Self {
        Self {
            gicd_addr,
            gicc_addr: None,
            gicr_addr: Some(gicr_addr),
        }
    }
}

/// Architecture specific parts of a VM descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchConfig {
    pub gic: GicConfig,
}

/// Full description of one VM partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDescriptor {
    /// Diagnostic label; may be empty.
    pub name: &'static str,
    pub image: VmImage,
    /// Guest physical entry address; must lie within one of `regions`.
    pub entry: u64,
    /// Number of virtual cores.
    pub cpu_num: u32,
    /// Bitmask over physical core indices this VM may run on.
    /// Zero means "any single core".
    pub cpu_affinity: u64,
    /// Bitmask over cache partition units. Zero means "unpartitioned".
    pub colors: u64,
    pub regions: Vec<MemRegion>,
    pub devices: Vec<DeviceRegion>,
    pub ipcs: Vec<IpcChannel>,
    pub arch: ArchConfig,
}

/// The root configuration value: every VM partition plus the shared memory
/// segments linking them. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    vms: Vec<VmDescriptor>,
    shmem: Vec<SharedMemorySegment>,
}

// The binding pipeline may run on several cores over the same config.
static_assertions::assert_impl_all!(PlatformConfig: Send, Sync);

impl PlatformConfig {
    /// Construct the configuration, running all structural well-formedness
    /// checks against the given hardware geometry.
    ///
    /// Resource semantics (overlaps, ownership, linkage) are deliberately
    /// not checked here; see [`crate::bind`].
    pub fn new(
        vms: Vec<VmDescriptor>,
        shmem: Vec<SharedMemorySegment>,
        platform: &Platform,
    ) -> Result<Self, ConfigError> {
        if vms.is_empty() {
            return Err(MalformedDescriptor::NoVms.into());
        }

        for (id, segment) in shmem.iter().enumerate() {
            let id = ShmemId::new(id as u16);
            if segment.size == 0 {
                return Err(MalformedDescriptor::ZeroSizeSegment { shmem: id }.into());
            }
            if !platform.is_page_aligned(segment.size) {
                return Err(MalformedDescriptor::UnalignedSegment {
                    shmem: id,
                    size: segment.size,
                    page_size: platform.page_size,
                }
                .into());
            }
        }

        for (id, vm) in vms.iter().enumerate() {
            check_vm(VmId::new(id as u16), vm, platform)?;
        }

        Ok(Self { vms, shmem })
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn vm(&self, id: VmId) -> &VmDescriptor {
        &self.vms[id.index()]
    }

    /// All VMs paired with their handles, in descriptor order.
    pub fn vms(&self) -> impl Iterator<Item = (VmId, &VmDescriptor)> {
        self.vms
            .iter()
            .enumerate()
            .map(|(i, vm)| (VmId::new(i as u16), vm))
    }

    pub fn segment(&self, id: ShmemId) -> Option<&SharedMemorySegment> {
        self.shmem.get(id.index())
    }

    /// All shared memory segments paired with their handles.
    pub fn segments(&self) -> impl Iterator<Item = (ShmemId, &SharedMemorySegment)> {
        self.shmem
            .iter()
            .enumerate()
            .map(|(i, seg)| (ShmemId::new(i as u16), seg))
    }
}

/// Check one addressed object for zero size, page alignment and overflow.
fn check_window(
    vm: VmId,
    what: &'static str,
    base: u64,
    size: u64,
    platform: &Platform,
) -> Result<(), MalformedDescriptor> {
    if size == 0 {
        return Err(MalformedDescriptor::ZeroSize { vm, what });
    }
    for value in [base, size] {
        if !platform.is_page_aligned(value) {
            return Err(MalformedDescriptor::Unaligned {
                vm,
                what,
                value,
                page_size: platform.page_size,
            });
        }
    }
    if base.checked_add(size).is_none() {
        return Err(MalformedDescriptor::AddressOverflow {
            vm,
            what,
            base,
            size,
        });
    }
    Ok(())
}

fn check_vm(id: VmId, vm: &VmDescriptor, platform: &Platform) -> Result<(), MalformedDescriptor> {
    if vm.cpu_num == 0 {
        return Err(MalformedDescriptor::NoVcpus { vm: id });
    }

    if vm.colors & !platform.color_mask() != 0 {
        return Err(MalformedDescriptor::ColorOutOfRange {
            vm: id,
            mask: vm.colors,
            color_num: platform.color_num,
        });
    }

    if vm.image.size == 0 {
        return Err(MalformedDescriptor::ZeroSize {
            vm: id,
            what: "image",
        });
    }
    if vm.image.base_addr.checked_add(vm.image.size).is_none() {
        return Err(MalformedDescriptor::AddressOverflow {
            vm: id,
            what: "image",
            base: vm.image.base_addr,
            size: vm.image.size,
        });
    }

    for region in &vm.regions {
        check_window(id, "memory region", region.base, region.size, platform)?;
    }

    for dev in &vm.devices {
        if let Some(mmio) = &dev.mmio {
            check_window(id, "device window (pa)", mmio.pa, mmio.size, platform)?;
            check_window(id, "device window (va)", mmio.va, mmio.size, platform)?;
        }
        for &irq in &dev.interrupts {
            if irq >= platform.irq_num {
                return Err(MalformedDescriptor::IrqOutOfRange {
                    vm: id,
                    irq,
                    irq_num: platform.irq_num,
                });
            }
        }
    }

    for ipc in &vm.ipcs {
        check_window(id, "ipc channel", ipc.base, ipc.size, platform)?;
        for &irq in &ipc.interrupts {
            if irq >= platform.irq_num {
                return Err(MalformedDescriptor::IrqOutOfRange {
                    vm: id,
                    irq,
                    irq_num: platform.irq_num,
                });
            }
        }
    }

    let gic = &vm.arch.gic;
    for addr in [Some(gic.gicd_addr), gic.gicc_addr, gic.gicr_addr]
        .into_iter()
        .flatten()
    {
        if !platform.is_page_aligned(addr) {
            return Err(MalformedDescriptor::Unaligned {
                vm: id,
                what: "gic window",
                value: addr,
                page_size: platform.page_size,
            });
        }
    }

    Ok(())
}
