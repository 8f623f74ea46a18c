//! [`DeviceFunctions`] implementation on top of an `ash::Device`.
//!
//! Every call lowers the typed create infos of this crate into the matching Vulkan structures. All data
//! referenced by pointers inside those structures is owned by a local buffer that outlives the Vulkan call.

use std::collections::HashSet;
use std::ffi::{c_void, CString};
use std::mem::MaybeUninit;

use ash::prelude::VkResult;
use ash::vk;

use crate::core::device::ExtensionID;
use crate::core::functions::{DeviceFunctions, PipelineBakeInfo, PipelineBatchResult};
use crate::descriptor::descriptor_pool::DescriptorPoolCreateInfo;
use crate::descriptor::descriptor_set::{DescriptorItem, DescriptorWrite, WriteContents};
use crate::pipeline::create_info::GraphicsPipelineState;
use crate::pipeline::set_layout::DescriptorSetLayoutCreateInfo;
use crate::pipeline::shader::{ShaderStage, ShaderStageInfo, SpecializationConstants};
use crate::util::to_vk::{AsVulkanType, IntoVulkanType};

/// Device functions backed by a real `VkDevice`. The device itself is owned by the caller and is not
/// destroyed when this is dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AshFunctions {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    shader_info: Option<vk::AmdShaderInfoFn>,
    #[derivative(Debug = "ignore")]
    debug_utils: Option<vk::ExtDebugUtilsFn>,
}

impl AshFunctions {
    /// Wrap a device. Extension function tables are only loaded for extensions in `extensions`.
    pub fn new(instance: &ash::Instance, device: ash::Device, extensions: &HashSet<ExtensionID>) -> Self {
        let handle = device.handle();
        // SAFETY: The returned pointers are either null or valid function pointers of the requested extension,
        // which has the exact signature the table expects.
        let load = |name: &std::ffi::CStr| unsafe {
            std::mem::transmute::<vk::PFN_vkVoidFunction, *const c_void>(instance.get_device_proc_addr(handle, name.as_ptr()))
        };
        let shader_info = extensions
            .contains(&ExtensionID::ShaderInfo)
            .then(|| vk::AmdShaderInfoFn::load(load));
        let debug_utils = extensions
            .contains(&ExtensionID::DebugUtils)
            .then(|| vk::ExtDebugUtilsFn::load(load));
        Self {
            device,
            shader_info,
            debug_utils,
        }
    }

    /// Access to the wrapped device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

/// Shader stages of one pipeline, with their entry points and specialization info.
struct LoweredStages {
    _entries: Vec<Vec<vk::SpecializationMapEntry>>,
    _specialization: Vec<vk::SpecializationInfo>,
    stages: Vec<vk::PipelineShaderStageCreateInfo>,
}

impl LoweredStages {
    fn new(stages: &[ShaderStageInfo], constants: &SpecializationConstants) -> Self {
        let entries = stages
            .iter()
            .map(|stage| {
                constants
                    .entries(stage.stage())
                    .iter()
                    .map(|entry| vk::SpecializationMapEntry {
                        constant_id: entry.constant_id,
                        offset: entry.offset,
                        size: entry.size as usize,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let specialization = entries
            .iter()
            .map(|entries| {
                vk::SpecializationInfo::builder()
                    .map_entries(entries.as_slice())
                    .data(constants.data())
                    .build()
            })
            .collect::<Vec<_>>();
        let stages = stages
            .iter()
            .zip(specialization.iter().zip(entries.iter()))
            .map(|(stage, (info, entries))| {
                let mut builder = vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage().into_vulkan())
                    // SAFETY: The module is kept alive by the create info of the pipeline.
                    .module(unsafe { stage.module().handle() })
                    .name(stage.entry_point());
                if !entries.is_empty() {
                    builder = builder.specialization_info(info);
                }
                builder.build()
            })
            .collect::<Vec<_>>();
        Self {
            _entries: entries,
            _specialization: specialization,
            stages,
        }
    }
}

/// Fixed function state of one graphics pipeline.
struct LoweredGraphics {
    _bindings: Vec<vk::VertexInputBindingDescription>,
    _attributes: Vec<vk::VertexInputAttributeDescription>,
    _blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    _rasterization_order: Option<Box<vk::PipelineRasterizationStateRasterizationOrderAMD>>,
    vertex_input: vk::PipelineVertexInputStateCreateInfo,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo,
    tessellation: Option<vk::PipelineTessellationStateCreateInfo>,
    viewport: vk::PipelineViewportStateCreateInfo,
    rasterization: vk::PipelineRasterizationStateCreateInfo,
    multisample: vk::PipelineMultisampleStateCreateInfo,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo,
    color_blend: vk::PipelineColorBlendStateCreateInfo,
    dynamic: vk::PipelineDynamicStateCreateInfo,
}

fn optional_ptr<T>(records: &[T]) -> *const T {
    if records.is_empty() {
        std::ptr::null()
    } else {
        records.as_ptr()
    }
}

impl LoweredGraphics {
    fn new(state: &GraphicsPipelineState, tessellation: bool) -> Self {
        let bindings = state.vertex_bindings.iter().map(AsVulkanType::as_vulkan).collect::<Vec<_>>();
        let attributes = state.vertex_attributes.iter().map(AsVulkanType::as_vulkan).collect::<Vec<_>>();
        let blend_attachments = state
            .color_blend
            .attachments
            .iter()
            .map(AsVulkanType::as_vulkan)
            .collect::<Vec<_>>();
        let rasterization_order = state.rasterization.rasterization_order.map(|order| {
            Box::new(
                vk::PipelineRasterizationStateRasterizationOrderAMD::builder()
                    .rasterization_order(order)
                    .build(),
            )
        });

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(bindings.as_slice())
            .vertex_attribute_descriptions(attributes.as_slice())
            .build();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.input_assembly.topology)
            .primitive_restart_enable(state.input_assembly.primitive_restart)
            .build();
        let tessellation = tessellation.then(|| {
            vk::PipelineTessellationStateCreateInfo::builder()
                .patch_control_points(state.patch_control_points)
                .build()
        });
        let viewport = vk::PipelineViewportStateCreateInfo {
            viewport_count: state.viewports.count(),
            p_viewports: optional_ptr(state.viewports.records()),
            scissor_count: state.scissors.count(),
            p_scissors: optional_ptr(state.scissors.records()),
            ..Default::default()
        };

        let raster = &state.rasterization;
        let bias = raster.depth_bias.unwrap_or_default();
        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(raster.depth_clamp)
            .rasterizer_discard_enable(raster.rasterizer_discard)
            .polygon_mode(raster.polygon_mode)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(raster.depth_bias.is_some())
            .depth_bias_constant_factor(bias.constant_factor)
            .depth_bias_clamp(bias.clamp)
            .depth_bias_slope_factor(bias.slope_factor)
            .line_width(raster.line_width)
            .build();
        if let Some(order) = &rasterization_order {
            rasterization.p_next = order.as_ref() as *const vk::PipelineRasterizationStateRasterizationOrderAMD as *const c_void;
        }

        let ms = &state.multisample;
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(ms.samples)
            .sample_shading_enable(ms.sample_shading)
            .min_sample_shading(ms.min_sample_shading)
            .sample_mask(ms.sample_mask_words())
            .alpha_to_coverage_enable(ms.alpha_to_coverage)
            .alpha_to_one_enable(ms.alpha_to_one)
            .build();

        let ds = &state.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(ds.depth_test)
            .depth_write_enable(ds.depth_write)
            .depth_compare_op(ds.depth_compare_op)
            .depth_bounds_test_enable(ds.depth_bounds_test)
            .stencil_test_enable(ds.stencil_test)
            .front(ds.front)
            .back(ds.back)
            .min_depth_bounds(ds.min_depth_bounds)
            .max_depth_bounds(ds.max_depth_bounds)
            .build();

        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(state.color_blend.logic_op_enable)
            .logic_op(state.color_blend.logic_op)
            .attachments(blend_attachments.as_slice())
            .blend_constants(state.color_blend.blend_constants)
            .build();
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(state.dynamic_states.as_slice())
            .build();

        Self {
            _bindings: bindings,
            _attributes: attributes,
            _blend_attachments: blend_attachments,
            _rasterization_order: rasterization_order,
            vertex_input,
            input_assembly,
            tessellation,
            viewport,
            rasterization,
            multisample,
            depth_stencil,
            color_blend,
            dynamic,
        }
    }
}

/// Descriptor infos of one write.
#[derive(Default)]
struct LoweredWrite {
    images: Vec<vk::DescriptorImageInfo>,
    buffers: Vec<vk::DescriptorBufferInfo>,
    views: Vec<vk::BufferView>,
    inline: Option<vk::WriteDescriptorSetInlineUniformBlock>,
}

impl LoweredWrite {
    fn new(write: &DescriptorWrite<'_>) -> Self {
        let mut lowered = Self::default();
        let items = match write.contents {
            WriteContents::Items(items) => items,
            WriteContents::InlineUniformBlock(data) => {
                lowered.inline = Some(vk::WriteDescriptorSetInlineUniformBlock::builder().data(data).build());
                return lowered;
            }
        };
        for item in items {
            match *item {
                DescriptorItem::Sampler(sampler) => lowered.images.push(vk::DescriptorImageInfo {
                    sampler,
                    ..Default::default()
                }),
                DescriptorItem::CombinedImageSampler(image, sampler) => lowered.images.push(vk::DescriptorImageInfo {
                    sampler,
                    image_view: image.view,
                    image_layout: image.layout,
                }),
                DescriptorItem::SampledImage(image)
                | DescriptorItem::StorageImage(image)
                | DescriptorItem::InputAttachment(image) => lowered.images.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: image.view,
                    image_layout: image.layout,
                }),
                DescriptorItem::UniformTexelBuffer(view) | DescriptorItem::StorageTexelBuffer(view) => lowered.views.push(view),
                DescriptorItem::UniformBuffer(range)
                | DescriptorItem::StorageBuffer(range)
                | DescriptorItem::DynamicUniformBuffer(range)
                | DescriptorItem::DynamicStorageBuffer(range) => lowered.buffers.push(vk::DescriptorBufferInfo {
                    buffer: range.buffer,
                    offset: range.offset,
                    range: range.range,
                }),
            }
        }
        lowered
    }

    fn to_vk(&self, write: &DescriptorWrite<'_>) -> vk::WriteDescriptorSet {
        vk::WriteDescriptorSet {
            p_next: self
                .inline
                .as_ref()
                .map_or(std::ptr::null(), |inline| inline as *const vk::WriteDescriptorSetInlineUniformBlock as *const c_void),
            dst_set: write.set,
            dst_binding: write.binding,
            dst_array_element: write.first_element,
            descriptor_count: write.count(),
            descriptor_type: write.kind.into_vulkan(),
            p_image_info: optional_ptr(self.images.as_slice()),
            p_buffer_info: optional_ptr(self.buffers.as_slice()),
            p_texel_buffer_view: optional_ptr(self.views.as_slice()),
            ..Default::default()
        }
    }
}

impl DeviceFunctions for AshFunctions {
    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout> {
        let bindings = info
            .bindings()
            .map(|(index, binding)| {
                let mut builder = vk::DescriptorSetLayoutBinding::builder()
                    .binding(index)
                    .descriptor_type(binding.kind().into_vulkan())
                    .descriptor_count(binding.array_size())
                    .stage_flags(binding.stages());
                if let Some(samplers) = binding.immutable_samplers() {
                    builder = builder.immutable_samplers(samplers);
                }
                builder.build()
            })
            .collect::<Vec<_>>();
        let binding_flags = info.bindings().map(|(_, binding)| binding.flags()).collect::<Vec<_>>();
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(binding_flags.as_slice());
        let mut builder = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings.as_slice());
        if binding_flags.iter().any(|flags| !flags.is_empty()) {
            builder = builder.push_next(&mut flags_info);
        }
        if info.is_update_after_bind() {
            builder = builder.flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL);
        }
        // SAFETY: Vulkan API call. All data referenced by the create info is alive.
        unsafe { self.device.create_descriptor_set_layout(&builder, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        unsafe { self.device.create_pipeline_layout(&info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        let sizes = info
            .sizes
            .iter()
            .map(|(kind, count)| vk::DescriptorPoolSize {
                ty: kind.into_vulkan(),
                descriptor_count: count,
            })
            .collect::<Vec<_>>();
        let mut inline_info = vk::DescriptorPoolInlineUniformBlockCreateInfo::builder()
            .max_inline_uniform_block_bindings(info.inline_uniform_block_bindings);
        let mut builder = vk::DescriptorPoolCreateInfo::builder()
            .flags(info.flags)
            .max_sets(info.max_sets)
            .pool_sizes(sizes.as_slice());
        if info.inline_uniform_block_bindings > 0 {
            builder = builder.push_next(&mut inline_info);
        }
        unsafe { self.device.create_descriptor_pool(&builder, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe { self.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
        variable_counts: Option<&[u32]>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut counts_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder()
            .descriptor_counts(variable_counts.unwrap_or_default());
        let mut info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        if variable_counts.is_some() {
            info = info.push_next(&mut counts_info);
        }
        unsafe { self.device.allocate_descriptor_sets(&info) }
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, sets) }
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]) {
        let lowered = writes.iter().map(LoweredWrite::new).collect::<Vec<_>>();
        let vk_writes = lowered
            .iter()
            .zip(writes)
            .map(|(lowered, write)| lowered.to_vk(write))
            .collect::<Vec<_>>();
        unsafe { self.device.update_descriptor_sets(vk_writes.as_slice(), &[]) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> VkResult<vk::PipelineCache> {
        let info = vk::PipelineCacheCreateInfo::builder().initial_data(initial_data);
        unsafe { self.device.create_pipeline_cache(&info, None) }
    }

    fn get_pipeline_cache_data(&self, cache: vk::PipelineCache) -> VkResult<Vec<u8>> {
        unsafe { self.device.get_pipeline_cache_data(cache) }
    }

    fn merge_pipeline_caches(&self, dst: vk::PipelineCache, src: &[vk::PipelineCache]) -> VkResult<()> {
        unsafe { self.device.merge_pipeline_caches(dst, src) }
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.device.destroy_pipeline_cache(cache, None) }
    }

    fn create_compute_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult {
        let stages = infos
            .iter()
            .map(|info| LoweredStages::new(info.stages, info.specialization))
            .collect::<Vec<_>>();
        let vk_infos = infos
            .iter()
            .zip(stages.iter())
            .map(|(info, stages)| vk::ComputePipelineCreateInfo {
                flags: info.flags,
                stage: stages.stages.first().copied().unwrap_or_default(),
                layout: info.layout,
                base_pipeline_handle: info.base_pipeline,
                base_pipeline_index: -1,
                ..Default::default()
            })
            .collect::<Vec<_>>();
        unsafe { self.device.create_compute_pipelines(cache, vk_infos.as_slice(), None) }
    }

    fn create_graphics_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult {
        let default_state = GraphicsPipelineState::default();
        let lowered = infos
            .iter()
            .map(|info| {
                let tessellation = info
                    .stages
                    .iter()
                    .any(|stage| stage.stage() == ShaderStage::TessellationControl);
                let state = info.graphics.unwrap_or(&default_state);
                (
                    LoweredStages::new(info.stages, info.specialization),
                    LoweredGraphics::new(state, tessellation),
                )
            })
            .collect::<Vec<_>>();
        let vk_infos = infos
            .iter()
            .zip(lowered.iter())
            .map(|(info, (stages, state))| {
                let state_info = info.graphics.unwrap_or(&default_state);
                vk::GraphicsPipelineCreateInfo {
                    flags: info.flags,
                    stage_count: stages.stages.len() as u32,
                    p_stages: stages.stages.as_ptr(),
                    p_vertex_input_state: &state.vertex_input,
                    p_input_assembly_state: &state.input_assembly,
                    p_tessellation_state: state
                        .tessellation
                        .as_ref()
                        .map_or(std::ptr::null(), |tessellation| tessellation as *const _),
                    p_viewport_state: &state.viewport,
                    p_rasterization_state: &state.rasterization,
                    p_multisample_state: &state.multisample,
                    p_depth_stencil_state: &state.depth_stencil,
                    p_color_blend_state: &state.color_blend,
                    p_dynamic_state: &state.dynamic,
                    layout: info.layout,
                    render_pass: state_info.render_pass,
                    subpass: state_info.subpass,
                    base_pipeline_handle: info.base_pipeline,
                    base_pipeline_index: -1,
                    ..Default::default()
                }
            })
            .collect::<Vec<_>>();
        unsafe { self.device.create_graphics_pipelines(cache, vk_infos.as_slice(), None) }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn get_shader_info(
        &self,
        pipeline: vk::Pipeline,
        stage: ShaderStage,
        info_type: vk::ShaderInfoTypeAMD,
    ) -> Option<VkResult<Vec<u8>>> {
        let fns = self.shader_info.as_ref()?;
        let device = self.device.handle();
        let stage = stage.into_vulkan();
        let mut size = 0usize;
        // SAFETY: Vulkan API call, using the two-call idiom.
        let result = unsafe {
            (fns.get_shader_info_amd)(device, pipeline, stage, info_type, &mut size, std::ptr::null_mut())
                .result()
                .and_then(|_| {
                    let mut data = vec![0u8; size];
                    (fns.get_shader_info_amd)(device, pipeline, stage, info_type, &mut size, data.as_mut_ptr().cast())
                        .result()
                        .map(|_| {
                            data.truncate(size);
                            data
                        })
                })
        };
        Some(result)
    }

    fn get_shader_statistics(&self, pipeline: vk::Pipeline, stage: ShaderStage) -> Option<VkResult<vk::ShaderStatisticsInfoAMD>> {
        let fns = self.shader_info.as_ref()?;
        let mut statistics = MaybeUninit::<vk::ShaderStatisticsInfoAMD>::zeroed();
        let mut size = std::mem::size_of::<vk::ShaderStatisticsInfoAMD>();
        // SAFETY: Vulkan API call. The driver writes at most `size` bytes, and a zeroed statistics struct is valid.
        let result = unsafe {
            (fns.get_shader_info_amd)(
                self.device.handle(),
                pipeline,
                stage.into_vulkan(),
                vk::ShaderInfoTypeAMD::STATISTICS,
                &mut size,
                statistics.as_mut_ptr().cast(),
            )
            .result()
            .map(|_| statistics.assume_init())
        };
        Some(result)
    }

    fn set_object_name(&self, object_type: vk::ObjectType, handle: u64, name: &str) -> VkResult<()> {
        let Some(fns) = self.debug_utils.as_ref() else {
            return Ok(());
        };
        // Nul bytes cannot be represented, they are dropped from the name.
        let name = CString::new(name.replace('\0', "")).unwrap_or_default();
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(handle)
            .object_name(&name);
        // SAFETY: Vulkan API call. The name outlives the call.
        unsafe { (fns.set_debug_utils_object_name_ext)(self.device.handle(), &*info).result() }
    }
}
