use crate::model::{IrqId, ShmemId, VmId};
use thiserror_no_std::Error;

/// Structural faults in a descriptor, detected before any resource semantics
/// are considered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedDescriptor {
    /// The configuration does not describe a single VM
    #[error("the configuration does not describe a single VM")]
    NoVms,
    /// An addressed object has zero size
    #[error("{vm}: {what} has zero size")]
    ZeroSize { vm: VmId, what: &'static str },
    /// An address or size is not aligned to the stage-2 page granule
    #[error("{vm}: {what} {value:#x} is not aligned to the {page_size:#x} byte page granule")]
    Unaligned {
        vm: VmId,
        what: &'static str,
        value: u64,
        page_size: u64,
    },
    /// An addressed object wraps around the end of the physical address space
    #[error("{vm}: {what} {base:#x}+{size:#x} overflows the address space")]
    AddressOverflow {
        vm: VmId,
        what: &'static str,
        base: u64,
        size: u64,
    },
    /// A VM is configured with no virtual cores
    #[error("{vm}: virtual core count must be at least 1")]
    NoVcpus { vm: VmId },
    /// A color mask names cache partition units the platform does not have
    #[error("{vm}: color mask {mask:#b} uses colors beyond the {color_num} supported units")]
    ColorOutOfRange { vm: VmId, mask: u64, color_num: u32 },
    /// An interrupt id is beyond what the interrupt controller can route
    #[error("{vm}: interrupt {irq} is beyond the {irq_num} lines of the interrupt controller")]
    IrqOutOfRange { vm: VmId, irq: IrqId, irq_num: u32 },
    /// The guest entry point lies outside all of the VM's memory regions
    #[error("{vm}: entry point {entry:#x} lies outside all of the VM's memory regions")]
    EntryOutsideMemory { vm: VmId, entry: u64 },
    /// The VM image does not fit into a single memory region
    #[error("{vm}: image at {base:#x}+{size:#x} does not fit into a single memory region")]
    ImageOutsideMemory { vm: VmId, base: u64, size: u64 },
    /// A shared memory segment has zero size
    #[error("shared memory segment {shmem} has zero size")]
    ZeroSizeSegment { shmem: ShmemId },
    /// A shared memory segment size is not page-aligned
    #[error("shared memory segment {shmem} size {size:#x} is not aligned to the {page_size:#x} byte page granule")]
    UnalignedSegment {
        shmem: ShmemId,
        size: u64,
        page_size: u64,
    },
}

/// Any reason a configuration must be rejected.
///
/// Every variant carries enough identifying data to tell an operator exactly
/// which VM and which resource is at fault. All of these are detected before
/// any VM executes; a rejected configuration halts bring-up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A descriptor is structurally broken
    #[error("malformed descriptor: {0}")]
    Malformed(#[from] MalformedDescriptor),
    /// Two memory mappings overlap without a shared memory link or an
    /// explicit sharing declaration covering both sides
    #[error("memory of {vm_a} and {vm_b} overlaps at {base:#x}+{size:#x} without a shared memory link")]
    MemoryOverlapConflict {
        vm_a: VmId,
        vm_b: VmId,
        base: u64,
        size: u64,
    },
    /// A shared peripheral interrupt is claimed by more than one owner
    #[error("interrupt {irq} is claimed by both {vm_a} and {vm_b}")]
    InterruptOwnershipConflict {
        irq: IrqId,
        vm_a: VmId,
        vm_b: VmId,
    },
    /// An IPC channel references a shared memory segment that does not exist
    #[error("{vm}: ipc channel references {shmem} but only {segment_count} shared memory segments are defined")]
    DanglingShmemReference {
        vm: VmId,
        shmem: ShmemId,
        segment_count: usize,
    },
    /// An IPC channel is larger than the segment backing it
    #[error("{vm}: ipc channel of {channel:#x} bytes exceeds the {segment:#x} byte segment {shmem}")]
    ChannelExceedsSegment {
        vm: VmId,
        shmem: ShmemId,
        channel: u64,
        segment: u64,
    },
    /// A VM maps the same shared memory segment more than once
    #[error("{vm}: maps segment {shmem} more than once")]
    DuplicateChannelMember { vm: VmId, shmem: ShmemId },
    /// A VM's GIC description selects no model, or both at once
    #[error("{vm}: exactly one of gicc_addr and gicr_addr must be set to select the GIC model")]
    AmbiguousGicVersion { vm: VmId },
    /// An affinity mask names cores the platform does not have
    #[error("{vm}: affinity mask {mask:#b} names cores beyond the {cpu_num} available")]
    AffinityOutOfRange { vm: VmId, mask: u64, cpu_num: u32 },
    /// A VM's affinity mask does not admit enough cores for its virtual cores
    #[error("{vm}: needs {want} cores but only {have} are eligible under its affinity mask")]
    InsufficientCores { vm: VmId, want: u32, have: u32 },
    /// Two VMs demand the same core exclusively
    #[error("core {core} is claimed exclusively by both {vm_a} and {vm_b}")]
    CoreOvercommitted { core: u32, vm_a: VmId, vm_b: VmId },
}
