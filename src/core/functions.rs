//! The GPU entry points the pipeline and descriptor managers depend on.
//!
//! [`DeviceFunctions`] takes the typed create infos of this crate instead of raw Vulkan structure chains.
//! [`AshFunctions`](crate::core::ash_functions::AshFunctions) lowers them onto an `ash::Device`, but any other
//! implementation (for example one that records calls) can be plugged into a [`Device`](crate::Device).

use ash::prelude::VkResult;
use ash::vk;

use crate::descriptor::descriptor_pool::DescriptorPoolCreateInfo;
use crate::descriptor::descriptor_set::DescriptorWrite;
use crate::pipeline::create_info::GraphicsPipelineState;
use crate::pipeline::set_layout::DescriptorSetLayoutCreateInfo;
use crate::pipeline::shader::{ShaderStage, ShaderStageInfo, SpecializationConstants};

/// Everything needed to bake one pipeline, with all referenced objects already resolved to handles.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBakeInfo<'a> {
    /// Pipeline creation flags. `DERIVATIVE` is only set if `base_pipeline` is a valid handle.
    pub flags: vk::PipelineCreateFlags,
    /// Shader stages, sorted by stage.
    pub stages: &'a [ShaderStageInfo],
    /// Specialization constants for all stages.
    pub specialization: &'a SpecializationConstants,
    /// Baked pipeline layout.
    pub layout: vk::PipelineLayout,
    /// Handle of the base pipeline for derivatives, or a null handle.
    pub base_pipeline: vk::Pipeline,
    /// Fixed function state. Always `None` for compute pipelines.
    pub graphics: Option<&'a GraphicsPipelineState>,
}

/// Result of a batched pipeline creation. On failure, the handles of pipelines that were created anyway
/// are returned together with the error, mirroring `vkCreate*Pipelines`.
pub type PipelineBatchResult = Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>;

/// Device level GPU API entry points.
pub trait DeviceFunctions: Send + Sync {
    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool>;
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one set per layout in a single call. `variable_counts`, if given, has one entry per layout.
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
        variable_counts: Option<&[u32]>,
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()>;
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]);

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> VkResult<vk::PipelineCache>;
    fn get_pipeline_cache_data(&self, cache: vk::PipelineCache) -> VkResult<Vec<u8>>;
    fn merge_pipeline_caches(&self, dst: vk::PipelineCache, src: &[vk::PipelineCache]) -> VkResult<()>;
    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);

    fn create_compute_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult;
    fn create_graphics_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// `vkGetShaderInfoAMD`. Returns `None` if the function is not loaded.
    fn get_shader_info(
        &self,
        _pipeline: vk::Pipeline,
        _stage: ShaderStage,
        _info_type: vk::ShaderInfoTypeAMD,
    ) -> Option<VkResult<Vec<u8>>> {
        None
    }

    /// `vkGetShaderInfoAMD` with `VK_SHADER_INFO_TYPE_STATISTICS_AMD`. Returns `None` if the function is not loaded.
    fn get_shader_statistics(
        &self,
        _pipeline: vk::Pipeline,
        _stage: ShaderStage,
    ) -> Option<VkResult<vk::ShaderStatisticsInfoAMD>> {
        None
    }

    /// Attach a debug name to an object. Does nothing unless debug utils are available.
    fn set_object_name(&self, _object_type: vk::ObjectType, _handle: u64, _name: &str) -> VkResult<()> {
        Ok(())
    }
}
