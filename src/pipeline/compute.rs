//! Builder for compute pipelines

use anyhow::Result;
use ash::vk;

use crate::pipeline::builder::CommonPipelineState;
use crate::pipeline::create_info::{PipelineCreateInfo, PipelineKind};
use crate::pipeline::pipeline_layout::PushConstantRange;
use crate::pipeline::set_layout::DescriptorSetLayoutCreateInfo;
use crate::pipeline::shader::{ShaderStage, ShaderStageInfo};
use crate::pipeline::PipelineId;

/// Builder struct similar to [`GraphicsPipelineBuilder`](crate::pipeline::builder::GraphicsPipelineBuilder), but for compute
/// pipelines. Since compute pipelines are much simpler, there is much less work to do when building one.
#[derive(Debug)]
pub struct ComputePipelineBuilder {
    common: CommonPipelineState,
}

impl ComputePipelineBuilder {
    /// Create a new compute pipeline using the given shader. Compute pipelines can only have one shader.
    pub fn new(shader: ShaderStageInfo) -> Self {
        let mut common = CommonPipelineState::default();
        common.attach_shader(shader);
        Self {
            common,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.common.name(name);
        self
    }

    pub fn flags(mut self, flags: vk::PipelineCreateFlags) -> Self {
        self.common.flags(flags);
        self
    }

    pub fn allow_derivatives(self) -> Self {
        self.flags(vk::PipelineCreateFlags::ALLOW_DERIVATIVES)
    }

    pub fn disable_optimizations(self) -> Self {
        self.flags(vk::PipelineCreateFlags::DISABLE_OPTIMIZATION)
    }

    pub fn base_pipeline(mut self, base: PipelineId) -> Self {
        self.common.base_pipeline(base);
        self
    }

    /// Proxy pipelines are never baked, and only serve as a base for derivatives.
    pub fn proxy(mut self) -> Self {
        self.common.proxy();
        self
    }

    pub fn specialization_constant(mut self, constant_id: u32, value: &[u8]) -> Self {
        self.common.specialization_constant(ShaderStage::Compute, constant_id, value);
        self
    }

    pub fn set_layout(mut self, set: u32, layout: Option<DescriptorSetLayoutCreateInfo>) -> Self {
        self.common.set_layout(set, layout);
        self
    }

    pub fn set_layouts(mut self, layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>) -> Self {
        self.common.set_layouts(layouts);
        self
    }

    pub fn push_constant(mut self, offset: u32, size: u32) -> Self {
        self.common
            .push_constant(PushConstantRange::new(offset, size, vk::ShaderStageFlags::COMPUTE));
        self
    }

    /// Build the compute pipeline create info.
    /// # Errors
    /// - Fails if the shader is not a compute shader.
    /// - Fails if the push constant ranges are invalid.
    pub fn build(self) -> Result<PipelineCreateInfo> {
        self.common
            .finish(&[ShaderStage::Compute], ShaderStage::Compute, PipelineKind::Compute)
    }
}
