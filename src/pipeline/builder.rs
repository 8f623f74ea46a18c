//! The pipeline builder is used to easily create graphics pipelines correctly.

use anyhow::Result;
use ash::vk;

use crate::core::error::precondition;
use crate::pipeline::create_info::*;
use crate::pipeline::pipeline_layout::{PipelineLayoutCreateInfo, PushConstantRange};
use crate::pipeline::set_layout::DescriptorSetLayoutCreateInfo;
use crate::pipeline::shader::{ShaderStage, ShaderStageInfo, SpecializationConstants};
use crate::pipeline::PipelineId;
use crate::Error;

/// State shared by the compute and graphics pipeline builders.
#[derive(Debug, Default)]
pub(crate) struct CommonPipelineState {
    name: Option<String>,
    flags: vk::PipelineCreateFlags,
    role: PipelineRole,
    base_pipeline: Option<PipelineId>,
    stages: Vec<ShaderStageInfo>,
    specialization: SpecializationConstants,
    set_layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>,
    push_constants: Vec<PushConstantRange>,
}

impl CommonPipelineState {
    pub fn name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn flags(&mut self, flags: vk::PipelineCreateFlags) {
        self.flags |= flags;
    }

    pub fn base_pipeline(&mut self, base: PipelineId) {
        self.base_pipeline = Some(base);
    }

    pub fn proxy(&mut self) {
        self.role = PipelineRole::Proxy;
    }

    pub fn attach_shader(&mut self, shader: ShaderStageInfo) {
        self.stages.push(shader);
    }

    pub fn specialization_constant(&mut self, stage: ShaderStage, constant_id: u32, value: &[u8]) {
        self.specialization.add(stage, constant_id, value);
    }

    pub fn set_layout(&mut self, set: u32, layout: Option<DescriptorSetLayoutCreateInfo>) {
        let set = set as usize;
        if self.set_layouts.len() <= set {
            self.set_layouts.resize(set + 1, None);
        }
        self.set_layouts[set] = layout;
    }

    pub fn set_layouts(&mut self, layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>) {
        self.set_layouts = layouts;
    }

    pub fn push_constant(&mut self, range: PushConstantRange) {
        self.push_constants.push(range);
    }

    pub fn stages(&self) -> &[ShaderStageInfo] {
        self.stages.as_slice()
    }

    /// Validate the shader stages against `allowed` and produce the final create info.
    pub fn finish(mut self, allowed: &[ShaderStage], required: ShaderStage, kind: PipelineKind) -> Result<PipelineCreateInfo> {
        self.stages.sort_by_key(|stage| stage.stage());
        for pair in self.stages.windows(2) {
            if pair[0].stage() == pair[1].stage() {
                return Err(precondition(Error::DuplicateShaderStage(pair[0].stage())));
            }
        }
        if let Some(stage) = self.stages.iter().find(|stage| !allowed.contains(&stage.stage())) {
            return Err(precondition(Error::InvalidShaderStage(stage.stage())));
        }
        if !self.stages.iter().any(|stage| stage.stage() == required) {
            return Err(precondition(Error::MissingShaderStage(required)));
        }
        // Specialization constants for stages that are not attached would never reach the driver.
        if let Some(stage) = allowed
            .iter()
            .copied()
            .find(|stage| !self.specialization.entries(*stage).is_empty() && !self.stages.iter().any(|info| info.stage() == *stage))
        {
            return Err(precondition(Error::MissingShaderStage(stage)));
        }

        let layout = PipelineLayoutCreateInfo::new(self.set_layouts, self.push_constants.as_slice())?;
        let mut flags = self.flags;
        if self.base_pipeline.is_some() {
            flags |= vk::PipelineCreateFlags::DERIVATIVE;
        }
        Ok(PipelineCreateInfo {
            name: self.name,
            flags,
            role: self.role,
            base_pipeline: self.base_pipeline,
            stages: self.stages,
            specialization: self.specialization,
            layout,
            kind,
        })
    }
}

/// Used to facilitate creating a graphics pipeline. For an example of the general flow, please check the
/// [`pipeline`](crate::pipeline) module level documentation.
///
/// For information on each method, please check the Vulkan documentation for
/// [`VkGraphicsPipelineCreateInfo`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/VkGraphicsPipelineCreateInfo.html).
/// All fixed function state starts out with the defaults of [`GraphicsPipelineState::default()`].
#[derive(Debug, Default)]
pub struct GraphicsPipelineBuilder {
    common: CommonPipelineState,
    state: GraphicsPipelineState,
}

impl GraphicsPipelineBuilder {
    /// Create a new empty pipeline with default settings for everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug name of the pipeline.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.common.name(name);
        self
    }

    /// Add pipeline creation flags.
    pub fn flags(mut self, flags: vk::PipelineCreateFlags) -> Self {
        self.common.flags(flags);
        self
    }

    /// Allow other pipelines to derive from this one.
    pub fn allow_derivatives(self) -> Self {
        self.flags(vk::PipelineCreateFlags::ALLOW_DERIVATIVES)
    }

    /// Ask the driver to skip pipeline optimizations, for faster creation while debugging.
    pub fn disable_optimizations(self) -> Self {
        self.flags(vk::PipelineCreateFlags::DISABLE_OPTIMIZATION)
    }

    /// Derive this pipeline from `base`, which must have been created with [`GraphicsPipelineBuilder::allow_derivatives()`].
    pub fn base_pipeline(mut self, base: PipelineId) -> Self {
        self.common.base_pipeline(base);
        self
    }

    /// Turn this pipeline into a proxy. Proxy pipelines are never baked, and only serve as a base for derivatives.
    pub fn proxy(mut self) -> Self {
        self.common.proxy();
        self
    }

    /// Attach a shader stage. A vertex shader is required, compute shaders are not allowed.
    pub fn attach_shader(mut self, shader: ShaderStageInfo) -> Self {
        self.common.attach_shader(shader);
        self
    }

    /// Add a specialization constant for `stage`. The bytes are copied.
    pub fn specialization_constant(mut self, stage: ShaderStage, constant_id: u32, value: &[u8]) -> Self {
        self.common.specialization_constant(stage, constant_id, value);
        self
    }

    /// Set the descriptor set layout used for set index `set`. Unset indices below it stay empty.
    pub fn set_layout(mut self, set: u32, layout: Option<DescriptorSetLayoutCreateInfo>) -> Self {
        self.common.set_layout(set, layout);
        self
    }

    /// Replace all descriptor set layouts at once.
    pub fn set_layouts(mut self, layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>) -> Self {
        self.common.set_layouts(layouts);
        self
    }

    /// Add a push constant range visible to `stage_flags`.
    pub fn push_constant(mut self, stage_flags: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.common.push_constant(PushConstantRange::new(offset, size, stage_flags));
        self
    }

    /// Add a vertex attribute at `location`. If `binding` is `None`, the attribute gets its own vertex binding.
    /// Otherwise all attributes on the same binding must agree on stride and input rate.
    /// # Errors
    /// - Fails if `location` is already in use.
    /// - Fails if `binding` was previously declared with a different stride or input rate.
    pub fn vertex_attribute(
        mut self,
        location: u32,
        format: vk::Format,
        offset: u32,
        stride: u32,
        input_rate: vk::VertexInputRate,
        binding: Option<u32>,
    ) -> Result<Self> {
        if self.state.vertex_attributes.iter().any(|attr| attr.location == location) {
            return Err(precondition(Error::DuplicateVertexLocation(location)));
        }
        let bindings = &mut self.state.vertex_bindings;
        let binding = match binding {
            Some(index) => index,
            None => (0..).find(|index| bindings.iter().all(|b| b.binding != *index)).unwrap_or_default(),
        };
        match bindings.iter().find(|b| b.binding == binding) {
            Some(existing) if existing.stride != stride || existing.input_rate != input_rate => {
                return Err(precondition(Error::VertexBindingMismatch(binding)));
            }
            Some(_) => {}
            None => bindings.push(VertexBinding {
                binding,
                stride,
                input_rate,
            }),
        }
        self.state.vertex_attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset,
        });
        Ok(self)
    }

    /// Primitive topology of the input assembly. Defaults to a triangle list.
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.state.input_assembly.topology = topology;
        self
    }

    /// Enable primitive restart for indexed draws.
    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.state.input_assembly.primitive_restart = enable;
        self
    }

    /// Use fixed viewports. Also sets the viewport count.
    pub fn viewports(mut self, viewports: Vec<vk::Viewport>) -> Self {
        self.state.viewports = ViewportRecords::Explicit(viewports);
        self
    }

    /// Only declare the amount of viewports, the viewports themselves are set dynamically.
    pub fn viewport_count(mut self, count: u32) -> Self {
        self.state.viewports = ViewportRecords::Count(count);
        self
    }

    /// Use fixed scissor rectangles. Also sets the scissor count.
    pub fn scissors(mut self, scissors: Vec<vk::Rect2D>) -> Self {
        self.state.scissors = ViewportRecords::Explicit(scissors);
        self
    }

    /// Only declare the amount of scissors, the rectangles themselves are set dynamically.
    pub fn scissor_count(mut self, count: u32) -> Self {
        self.state.scissors = ViewportRecords::Count(count);
        self
    }

    /// Mark a piece of pipeline state as dynamic. Duplicates are ignored.
    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.state.dynamic_states.contains(&state) {
            self.state.dynamic_states.push(state);
        }
        self
    }

    /// Mark several pieces of pipeline state as dynamic.
    pub fn dynamic_states(self, states: &[vk::DynamicState]) -> Self {
        states.iter().fold(self, |builder, state| builder.dynamic_state(*state))
    }

    /// Amount of control points per patch, for tessellation pipelines.
    pub fn patch_control_points(mut self, points: u32) -> Self {
        self.state.patch_control_points = points;
        self
    }

    /// Polygon fill mode of the rasterizer.
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.state.rasterization.polygon_mode = mode;
        self
    }

    /// Faces culled by the rasterizer.
    pub fn cull_mask(mut self, cull: vk::CullModeFlags) -> Self {
        self.state.rasterization.cull_mode = cull;
        self
    }

    /// Winding order of front facing triangles.
    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.state.rasterization.front_face = face;
        self
    }

    /// Width of rasterized lines.
    pub fn line_width(mut self, width: f32) -> Self {
        self.state.rasterization.line_width = width;
        self
    }

    /// Clamp fragment depth instead of clipping against the near and far planes.
    pub fn depth_clamp(mut self, enable: bool) -> Self {
        self.state.rasterization.depth_clamp = enable;
        self
    }

    /// Discard all primitives before rasterization.
    pub fn rasterizer_discard(mut self, enable: bool) -> Self {
        self.state.rasterization.rasterizer_discard = enable;
        self
    }

    /// Enable depth bias with the given factors.
    pub fn depth_bias(mut self, constant_factor: f32, clamp: f32, slope_factor: f32) -> Self {
        self.state.rasterization.depth_bias = Some(DepthBias {
            constant_factor,
            clamp,
            slope_factor,
        });
        self
    }

    /// Set the primitive rasterization order.
    /// Requires [`ExtensionID::RasterizationOrder`](crate::core::device::ExtensionID::RasterizationOrder), checked when the
    /// pipeline is added to a manager.
    pub fn rasterization_order(mut self, order: vk::RasterizationOrderAMD) -> Self {
        self.state.rasterization.rasterization_order = Some(order);
        self
    }

    /// Number of rasterization samples.
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.state.multisample.samples = samples;
        self
    }

    /// Enable sample shading with the given minimum fraction.
    pub fn sample_shading(mut self, min_sample_shading: f32) -> Self {
        self.state.multisample.sample_shading = true;
        self.state.multisample.min_sample_shading = min_sample_shading;
        self
    }

    /// Coverage mask applied to every sample.
    pub fn sample_mask(mut self, mask: [u32; 2]) -> Self {
        self.state.multisample.sample_mask = mask;
        self
    }

    /// Generate coverage from the alpha channel of the first color output.
    pub fn alpha_to_coverage(mut self, enable: bool) -> Self {
        self.state.multisample.alpha_to_coverage = enable;
        self
    }

    /// Replace the alpha channel of the first color output with one.
    pub fn alpha_to_one(mut self, enable: bool) -> Self {
        self.state.multisample.alpha_to_one = enable;
        self
    }

    /// Configure the depth test, depth writes and the depth compare operation.
    pub fn depth(mut self, test: bool, write: bool, compare: vk::CompareOp) -> Self {
        self.state.depth_stencil.depth_test = test;
        self.state.depth_stencil.depth_write = write;
        self.state.depth_stencil.depth_compare_op = compare;
        self
    }

    /// Enable the depth bounds test with the given range.
    pub fn depth_bounds(mut self, min: f32, max: f32) -> Self {
        self.state.depth_stencil.depth_bounds_test = true;
        self.state.depth_stencil.min_depth_bounds = min;
        self.state.depth_stencil.max_depth_bounds = max;
        self
    }

    /// Enable the stencil test with the given front and back face operations.
    pub fn stencil(mut self, front: vk::StencilOpState, back: vk::StencilOpState) -> Self {
        self.state.depth_stencil.stencil_test = true;
        self.state.depth_stencil.front = front;
        self.state.depth_stencil.back = back;
        self
    }

    /// Add a color attachment without blending that writes all channels.
    pub fn blend_attachment_none(self) -> Self {
        self.blend_attachment(ColorBlendAttachment::default())
    }

    /// Add a color attachment with its blend state. Attachments are added in order.
    pub fn blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.state.color_blend.attachments.push(attachment);
        self
    }

    /// Enable a framebuffer logic operation. Replaces blending for all attachments.
    pub fn logic_op(mut self, op: vk::LogicOp) -> Self {
        self.state.color_blend.logic_op_enable = true;
        self.state.color_blend.logic_op = op;
        self
    }

    /// Constant color used by the blend factors that reference it.
    pub fn blend_constants(mut self, constants: [f32; 4]) -> Self {
        self.state.color_blend.blend_constants = constants;
        self
    }

    /// Render pass and subpass this pipeline is used in.
    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.state.render_pass = render_pass;
        self.state.subpass = subpass;
        self
    }

    /// Validate the shader stages and build the pipeline create info.
    /// # Errors
    /// - Fails if no vertex shader was attached, or a compute shader was.
    /// - Fails if a stage was attached twice, or only one of the two tessellation stages is present.
    /// - Fails if the push constant ranges are invalid.
    pub fn build(self) -> Result<PipelineCreateInfo> {
        let has = |stage| self.common.stages().iter().any(|info| info.stage() == stage);
        match (has(ShaderStage::TessellationControl), has(ShaderStage::TessellationEvaluation)) {
            (true, false) => return Err(precondition(Error::MissingShaderStage(ShaderStage::TessellationEvaluation))),
            (false, true) => return Err(precondition(Error::MissingShaderStage(ShaderStage::TessellationControl))),
            _ => {}
        }
        let mut state = self.state;
        state.vertex_bindings.sort_by_key(|binding| binding.binding);
        state.vertex_attributes.sort_by_key(|attr| attr.location);
        self.common
            .finish(&ShaderStage::GRAPHICS, ShaderStage::Vertex, PipelineKind::Graphics(Box::new(state)))
    }
}

