//! The pipeline module exposes the layout managers and the [`PipelineManager`](manager::PipelineManager).
//!
//! Pipelines are registered with the manager as [`PipelineCreateInfo`](create_info::PipelineCreateInfo) values,
//! built with the [`ComputePipelineBuilder`](compute::ComputePipelineBuilder) or the
//! [`GraphicsPipelineBuilder`](builder::GraphicsPipelineBuilder). Registering a pipeline does not create it yet.
//! The first query for a handle bakes every outstanding pipeline in one batch, resolving pipeline layouts
//! through the device's [`PipelineLayoutManager`](pipeline_layout::PipelineLayoutManager) on the way.
//!
//! # Example
//!
//! ```ignore
//! use vkbake::prelude::*;
//!
//! let manager = PipelineManager::new(&device, PipelineCacheUsage::Private, ThreadingMode::SingleThreaded)?;
//! let shader = ShaderModule::from_spirv(&device, spirv.as_slice())?;
//!
//! // A base pipeline that other pipelines may derive from.
//! let base = ComputePipelineBuilder::new(ShaderStageInfo::new(ShaderStage::Compute, shader.clone()))
//!     .name("blur")
//!     .allow_derivatives()
//!     .set_layout(0, Some(layout.clone()))
//!     .build()?;
//! let base = manager.add_pipeline(base)?;
//!
//! let derived = ComputePipelineBuilder::new(ShaderStageInfo::new(ShaderStage::Compute, shader))
//!     .base_pipeline(base)
//!     .specialization_constant(0, &8u32.to_ne_bytes())
//!     .set_layout(0, Some(layout))
//!     .build()?;
//! let derived = manager.add_pipeline(derived)?;
//!
//! // Bakes both pipelines, the base first.
//! let handle = manager.get_pipeline(derived)?;
//! ```

use std::fmt::Formatter;

pub mod builder;
pub mod cache;
pub mod compute;
pub mod create_info;
pub mod manager;
pub mod pipeline_layout;
pub mod set_layout;
pub mod shader;

/// Identifies a pipeline registered with a [`PipelineManager`](manager::PipelineManager). Ids are
/// unique within one manager and never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub(crate) u32);

impl PipelineId {
    /// Reconstruct an id from its raw value, for example one stored by the application.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value of this id. `u32::MAX` is never handed out.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
