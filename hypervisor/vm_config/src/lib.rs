//! Configuration ingestion and static resource binding for partitioned VMs
//!
//! Every VM in this hypervisor receives a fixed slice of memory, devices,
//! interrupts, cores and cache capacity, decided entirely at build time.
//! This crate is the single point where a partition description is turned
//! into bindings the hardware-facing code may trust: a malformed or
//! conflicting configuration is rejected here, before any VM executes,
//! instead of silently corrupting isolation at runtime.
//!
//! The pipeline is a pure function of an immutable [`model::PlatformConfig`]
//! and the [`platform::Platform`] geometry:
//!
//! 1. structural well-formedness is checked when the config is constructed,
//! 2. [`shmem`] resolves IPC channels into channel groups,
//! 3. [`validate`] proves memory, device and interrupt exclusivity
//!    (accepting only explicitly declared sharing),
//! 4. [`color`], [`gic`] and [`affinity`] derive the immutable binding
//!    tables the stage-2 mapper, the interrupt controller driver, the cache
//!    partitioning driver and the bring-up code consume.
//!
//! No step performs I/O or touches shared mutable state, and only ordered
//! containers are used, so independently computed bindings on different
//! boot cores are always identical.
#![no_std]

extern crate alloc;

pub mod affinity;
pub mod color;
mod error;
pub mod gic;
pub mod model;
pub mod shmem;
pub mod validate;

#[cfg(test)]
pub(crate) mod testcfg;

pub use error::{ConfigError, MalformedDescriptor};

use crate::affinity::AffinityPlan;
use crate::color::ColorPlan;
use crate::gic::IrqPlan;
use crate::model::PlatformConfig;
use crate::shmem::ChannelGroup;
use crate::validate::SharingReport;
use alloc::vec::Vec;
use platform::Platform;

/// Everything the runtime collaborators need, derived once and never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBindings {
    /// Channel groups for the stage-2 mapper, ordered by segment.
    pub channels: Vec<ChannelGroup>,
    /// Every intentional overlap the validator accepted.
    pub sharing: SharingReport,
    /// Pairwise cache color intersections.
    pub colors: ColorPlan,
    /// SPI routing and per-VM virtual GIC layout.
    pub irqs: IrqPlan,
    /// Per-core boot assignment.
    pub affinity: AffinityPlan,
}

/// Run the full validation and binding pipeline.
///
/// Fails with the first [`ConfigError`] encountered; a failed configuration
/// must halt bring-up. The channel groups are linked before the conflict
/// validator runs because the validator's overlap exemption relies on them
/// being sound.
pub fn bind(config: &PlatformConfig, platform: &Platform) -> Result<ConfigBindings, ConfigError> {
    log::debug!(
        "binding configuration with {} VMs for {}",
        config.vm_count(),
        platform.name
    );

    let channels = shmem::link(config)?;
    let sharing = validate::validate(config, &channels)?;
    let colors = color::plan(config, platform);
    let irqs = gic::build(config, &channels)?;
    let affinity = affinity::resolve(config, platform)?;

    log::debug!(
        "bound {} channel groups, {} routed SPIs",
        channels.len(),
        irqs.spis.len()
    );

    Ok(ConfigBindings {
        channels,
        sharing,
        colors,
        irqs,
        affinity,
    })
}
