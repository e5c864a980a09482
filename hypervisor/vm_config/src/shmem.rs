//! IPC / shared memory linking
//!
//! Resolves every [`IpcChannel`] against the segment list and groups the
//! channels by segment: all channels referencing the same [`ShmemId`] form
//! one channel group whose members communicate through the same backing
//! memory.

use crate::error::ConfigError;
use crate::model::{IrqId, PlatformConfig, ShmemId, VmId};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// One VM's mapping of a channel group's segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub vm: VmId,
    /// Guest address the member maps the segment at.
    pub base: u64,
    /// Mapped size; at most the segment size.
    pub size: u64,
    /// Notification interrupts delivered to this member.
    pub interrupts: Vec<IrqId>,
}

/// All VMs mapping one shared memory segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub shmem: ShmemId,
    /// Size of the backing segment.
    pub size: u64,
    /// Members ordered by [`VmId`].
    pub members: Vec<ChannelEndpoint>,
}

impl ChannelGroup {
    pub fn member(&self, vm: VmId) -> Option<&ChannelEndpoint> {
        self.members.iter().find(|m| m.vm == vm)
    }
}

/// Group all IPC channels by their backing segment.
///
/// Fails when a channel references a segment that does not exist, maps more
/// of a segment than it has, or when one VM maps the same segment twice.
/// Segments no channel references are only warned about.
pub fn link(config: &PlatformConfig) -> Result<Vec<ChannelGroup>, ConfigError> {
    let mut groups: BTreeMap<ShmemId, ChannelGroup> = BTreeMap::new();

    for (vm_id, vm) in config.vms() {
        for ipc in &vm.ipcs {
            let segment = config.segment(ipc.shmem_id).ok_or_else(|| {
                ConfigError::DanglingShmemReference {
                    vm: vm_id,
                    shmem: ipc.shmem_id,
                    segment_count: config.segments().count(),
                }
            })?;

            if ipc.size > segment.size {
                return Err(ConfigError::ChannelExceedsSegment {
                    vm: vm_id,
                    shmem: ipc.shmem_id,
                    channel: ipc.size,
                    segment: segment.size,
                });
            }

            let group = groups.entry(ipc.shmem_id).or_insert_with(|| ChannelGroup {
                shmem: ipc.shmem_id,
                size: segment.size,
                members: Vec::new(),
            });

            if group.members.iter().any(|m| m.vm == vm_id) {
                return Err(ConfigError::DuplicateChannelMember {
                    vm: vm_id,
                    shmem: ipc.shmem_id,
                });
            }

            // VMs are visited in id order, so members stay sorted.
            group.members.push(ChannelEndpoint {
                vm: vm_id,
                base: ipc.base,
                size: ipc.size,
                interrupts: ipc.interrupts.clone(),
            });
        }
    }

    for (id, segment) in config.segments() {
        if !groups.contains_key(&id) {
            log::warn!(
                "shared memory segment {id} ({:#x} bytes) is referenced by no channel",
                segment.size
            );
        }
    }

    Ok(groups.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IpcChannel, SharedMemorySegment};
    use crate::testcfg;
    use alloc::vec;
    use platform::QEMU_AARCH64_VIRT;

    #[test]
    fn four_member_group_links_cleanly() {
        let config = testcfg::shmem_quartet(0x10000);
        let groups = link(&config).unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.shmem, ShmemId::new(0));
        assert_eq!(group.size, 0x10000);
        assert_eq!(group.members.len(), 4);
        for (i, member) in group.members.iter().enumerate() {
            assert_eq!(member.vm, VmId::new(i as u16));
            assert_eq!(member.base, 0x70000000);
            assert_eq!(member.interrupts, vec![52]);
        }
        // member lookup by id answers for every member and only members
        for i in 0..4u16 {
            let member = group.member(VmId::new(i)).unwrap();
            assert_eq!(member.vm, VmId::new(i));
        }
        assert!(group.member(VmId::new(4)).is_none());
    }

    #[test]
    fn channel_matching_segment_size_is_valid() {
        // boundary: member size == segment size
        let config = testcfg::shmem_quartet(0x10000);
        assert!(link(&config).is_ok());
    }

    #[test]
    fn oversized_channel_is_rejected() {
        let mut vm = testcfg::baremetal_vm(0x50000000, 0x4000000);
        vm.ipcs.push(IpcChannel {
            base: 0x70000000,
            size: 0x20000,
            shmem_id: ShmemId::new(0),
            interrupts: vec![],
        });
        let config = crate::model::PlatformConfig::new(
            vec![vm],
            vec![SharedMemorySegment { size: 0x10000 }],
            &QEMU_AARCH64_VIRT,
        )
        .unwrap();
        assert_eq!(
            link(&config),
            Err(ConfigError::ChannelExceedsSegment {
                vm: VmId::new(0),
                shmem: ShmemId::new(0),
                channel: 0x20000,
                segment: 0x10000,
            }),
        );
    }

    #[test]
    fn dangling_segment_reference_is_rejected() {
        let mut vm = testcfg::baremetal_vm(0x50000000, 0x4000000);
        vm.ipcs.push(IpcChannel {
            base: 0x70000000,
            size: 0x10000,
            shmem_id: ShmemId::new(3),
            interrupts: vec![],
        });
        let config =
            crate::model::PlatformConfig::new(vec![vm], vec![], &QEMU_AARCH64_VIRT).unwrap();
        assert_eq!(
            link(&config),
            Err(ConfigError::DanglingShmemReference {
                vm: VmId::new(0),
                shmem: ShmemId::new(3),
                segment_count: 0,
            }),
        );
    }

    #[test]
    fn double_mapping_by_one_vm_is_rejected() {
        let mut vm = testcfg::baremetal_vm(0x50000000, 0x4000000);
        for base in [0x70000000u64, 0x70010000] {
            vm.ipcs.push(IpcChannel {
                base,
                size: 0x10000,
                shmem_id: ShmemId::new(0),
                interrupts: vec![],
            });
        }
        let config = crate::model::PlatformConfig::new(
            vec![vm],
            vec![SharedMemorySegment { size: 0x10000 }],
            &QEMU_AARCH64_VIRT,
        )
        .unwrap();
        assert_eq!(
            link(&config),
            Err(ConfigError::DuplicateChannelMember {
                vm: VmId::new(0),
                shmem: ShmemId::new(0),
            }),
        );
    }

    #[test]
    fn unreferenced_segment_is_not_an_error() {
        let vm = testcfg::baremetal_vm(0x50000000, 0x4000000);
        let config = crate::model::PlatformConfig::new(
            vec![vm],
            vec![SharedMemorySegment { size: 0x10000 }],
            &QEMU_AARCH64_VIRT,
        )
        .unwrap();
        assert_eq!(link(&config), Ok(vec![]));
    }
}
