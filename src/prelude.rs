pub use ash::vk;

pub use crate::core::ash_functions::AshFunctions;
pub use crate::core::device::{Device, ExtensionID};
pub use crate::core::error::Error;
pub use crate::core::functions::{DeviceFunctions, PipelineBakeInfo, PipelineBatchResult};
pub use crate::core::settings::{DeviceSettings, DeviceSettingsBuilder};

pub use crate::descriptor::DescriptorKind;
pub use crate::descriptor::descriptor_pool::{DescriptorPool, DescriptorPoolCreateInfo, DescriptorPoolSize};
pub use crate::descriptor::descriptor_set::{BufferRange, DescriptorItem, DescriptorWrite, ImageBinding, WriteContents};
pub use crate::descriptor::set_group::{DescriptorSetGroup, DescriptorSetGroupCreateInfo};

pub use crate::pipeline::PipelineId;
pub use crate::pipeline::builder::GraphicsPipelineBuilder;
pub use crate::pipeline::cache::PipelineCache;
pub use crate::pipeline::compute::ComputePipelineBuilder;
pub use crate::pipeline::create_info::*;
pub use crate::pipeline::manager::{PipelineCacheUsage, PipelineManager};
pub use crate::pipeline::pipeline_layout::{PipelineLayout, PipelineLayoutCreateInfo, PipelineLayoutManager, PushConstantRange};
pub use crate::pipeline::set_layout::{
    DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutBuilder, DescriptorSetLayoutCreateInfo, DescriptorSetLayoutManager,
};
pub use crate::pipeline::shader::{ShaderModule, ShaderStage, ShaderStageInfo, ShaderStatistics, SpecializationConstants};

pub use crate::util::sync::ThreadingMode;
