//! Pipeline create info values. These are staged in a [`PipelineManager`](crate::pipeline::manager::PipelineManager)
//! until the pipeline is baked. Use the [`ComputePipelineBuilder`](crate::pipeline::compute::ComputePipelineBuilder) and
//! [`GraphicsPipelineBuilder`](crate::pipeline::builder::GraphicsPipelineBuilder) to construct them.

use ash::vk;

use crate::pipeline::pipeline_layout::PipelineLayoutCreateInfo;
use crate::pipeline::shader::{ShaderStage, ShaderStageInfo, SpecializationConstants};
use crate::pipeline::PipelineId;
use crate::util::to_vk::AsVulkanType;

/// Whether a pipeline is baked, or only serves as a template other pipelines derive from.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum PipelineRole {
    #[default]
    Regular,
    /// Never baked and never has a handle. Can only be used as the base of derivative pipelines,
    /// which are then baked without a base handle.
    Proxy,
}

/// Kind specific part of a pipeline create info.
#[derive(Debug, Clone)]
pub enum PipelineKind {
    Compute,
    Graphics(Box<GraphicsPipelineState>),
}

/// Describes one pending pipeline.
#[derive(Debug, Clone)]
pub struct PipelineCreateInfo {
    pub(crate) name: Option<String>,
    pub(crate) flags: vk::PipelineCreateFlags,
    pub(crate) role: PipelineRole,
    pub(crate) base_pipeline: Option<PipelineId>,
    /// Sorted by stage, at most one entry per stage.
    pub(crate) stages: Vec<ShaderStageInfo>,
    pub(crate) specialization: SpecializationConstants,
    pub(crate) layout: PipelineLayoutCreateInfo,
    pub(crate) kind: PipelineKind,
}

impl PipelineCreateInfo {
    /// Debug name, forwarded to the driver after baking.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn flags(&self) -> vk::PipelineCreateFlags {
        self.flags
    }

    pub fn role(&self) -> PipelineRole {
        self.role
    }

    pub fn is_proxy(&self) -> bool {
        self.role == PipelineRole::Proxy
    }

    /// Whether other pipelines may use this one as their base.
    pub fn allows_derivatives(&self) -> bool {
        self.flags.contains(vk::PipelineCreateFlags::ALLOW_DERIVATIVES)
    }

    pub fn base_pipeline(&self) -> Option<PipelineId> {
        self.base_pipeline
    }

    /// All attached shader stages, ordered by stage.
    pub fn stages(&self) -> &[ShaderStageInfo] {
        self.stages.as_slice()
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderStageInfo> {
        self.stages.iter().find(|info| info.stage() == stage)
    }

    pub fn specialization(&self) -> &SpecializationConstants {
        &self.specialization
    }

    /// Description of the pipeline layout, resolved through the pipeline layout manager when needed.
    pub fn layout(&self) -> &PipelineLayoutCreateInfo {
        &self.layout
    }

    pub fn kind(&self) -> &PipelineKind {
        &self.kind
    }

    pub fn is_compute(&self) -> bool {
        matches!(self.kind, PipelineKind::Compute)
    }

    /// Fixed function state, if this is a graphics pipeline.
    pub fn graphics(&self) -> Option<&GraphicsPipelineState> {
        match &self.kind {
            PipelineKind::Compute => None,
            PipelineKind::Graphics(state) => Some(state),
        }
    }
}

/// One vertex buffer binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

/// One vertex attribute, read from a [`VertexBinding`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

impl AsVulkanType for VertexBinding {
    type Output = vk::VertexInputBindingDescription;

    fn as_vulkan(&self) -> Self::Output {
        vk::VertexInputBindingDescription {
            binding: self.binding,
            stride: self.stride,
            input_rate: self.input_rate,
        }
    }
}

impl AsVulkanType for VertexAttribute {
    type Output = vk::VertexInputAttributeDescription;

    fn as_vulkan(&self) -> Self::Output {
        vk::VertexInputAttributeDescription {
            location: self.location,
            binding: self.binding,
            format: self.format,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

/// Viewports or scissors of a pipeline. Dynamic viewport state only needs a count.
#[derive(Debug, Clone)]
pub enum ViewportRecords<T> {
    Count(u32),
    Explicit(Vec<T>),
}

impl<T> ViewportRecords<T> {
    pub fn count(&self) -> u32 {
        match self {
            ViewportRecords::Count(count) => *count,
            ViewportRecords::Explicit(records) => records.len() as u32,
        }
    }

    pub fn records(&self) -> &[T] {
        match self {
            ViewportRecords::Count(_) => &[],
            ViewportRecords::Explicit(records) => records.as_slice(),
        }
    }
}

impl<T> Default for ViewportRecords<T> {
    fn default() -> Self {
        ViewportRecords::Count(1)
    }
}

/// Constant depth bias applied during rasterization.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RasterizationState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    /// `None` disables depth bias.
    pub depth_bias: Option<DepthBias>,
    /// Requires `VK_AMD_rasterization_order`.
    pub rasterization_order: Option<vk::RasterizationOrderAMD>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            depth_clamp: false,
            rasterizer_discard: false,
            depth_bias: None,
            rasterization_order: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    pub sample_shading: bool,
    pub min_sample_shading: f32,
    /// One bit per sample, up to 64 samples.
    pub sample_mask: [u32; 2],
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl MultisampleState {
    /// The words of the sample mask covering the configured sample count.
    pub fn sample_mask_words(&self) -> &[u32] {
        if self.samples.as_raw() > 32 {
            &self.sample_mask
        } else {
            &self.sample_mask[..1]
        }
    }
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: false,
            min_sample_shading: 1.0,
            sample_mask: [u32::MAX; 2],
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_test: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
    pub stencil_test: bool,
    pub front: vk::StencilOpState,
    pub back: vk::StencilOpState,
}

/// Keep on every outcome, always pass, full masks and reference 0.
pub fn default_stencil_op_state() -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        compare_mask: 0xff,
        write_mask: 0xff,
        reference: 0,
    }
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            depth_bounds_test: false,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
            stencil_test: false,
            front: default_stencil_op_state(),
            back: default_stencil_op_state(),
        }
    }
}

/// Blend configuration of a single color attachment. The default disables blending and writes all channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_factor: vk::BlendFactor,
    pub dst_color_factor: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha_factor: vk::BlendFactor,
    pub dst_alpha_factor: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl ColorBlendAttachment {
    /// Regular alpha blending, `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
            ..Default::default()
        }
    }
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: vk::BlendFactor::ONE,
            dst_color_factor: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl AsVulkanType for ColorBlendAttachment {
    type Output = vk::PipelineColorBlendAttachmentState;

    fn as_vulkan(&self) -> Self::Output {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable as vk::Bool32,
            src_color_blend_factor: self.src_color_factor,
            dst_color_blend_factor: self.dst_color_factor,
            color_blend_op: self.color_op,
            src_alpha_blend_factor: self.src_alpha_factor,
            dst_alpha_blend_factor: self.dst_alpha_factor,
            alpha_blend_op: self.alpha_op,
            color_write_mask: self.write_mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub attachments: Vec<ColorBlendAttachment>,
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::COPY,
            attachments: Vec::new(),
            blend_constants: [0.0; 4],
        }
    }
}

/// Fixed function state of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineState {
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub input_assembly: InputAssemblyState,
    pub viewports: ViewportRecords<vk::Viewport>,
    pub scissors: ViewportRecords<vk::Rect2D>,
    /// Only used if tessellation stages are attached.
    pub patch_control_points: u32,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl Default for GraphicsPipelineState {
    fn default() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            input_assembly: InputAssemblyState::default(),
            viewports: ViewportRecords::default(),
            scissors: ViewportRecords::default(),
            patch_control_points: 3,
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            dynamic_states: Vec::new(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }
}

impl GraphicsPipelineState {
    pub fn has_dynamic_state(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }
}
