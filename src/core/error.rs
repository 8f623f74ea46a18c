//! Exposes the vkbake error type

use ash;
use thiserror::Error;

use crate::core::device::ExtensionID;
use crate::descriptor::DescriptorKind;
use crate::pipeline::PipelineId;
use crate::pipeline::shader::ShaderStage;

/// Error type that vkbake can return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Generic Vulkan error type. The result code is passed through unchanged, so
    /// `VK_ERROR_OUT_OF_POOL_MEMORY` and `VK_ERROR_FRAGMENTED_POOL` can be told apart.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Function call requires extension to be enabled, but this extension was not requested or not available.
    #[error("Extension {0} required for this feature, but not enabled.")]
    ExtensionNotSupported(ExtensionID),
    /// Two bindings in one descriptor set layout use the same binding index.
    #[error("Binding {0} is declared more than once.")]
    DuplicateBinding(u32),
    /// Immutable samplers were given for a binding that is not a sampler or combined image sampler.
    #[error("Binding {0} of type {1:?} cannot carry immutable samplers.")]
    ImmutableSamplersNotAllowed(u32, DescriptorKind),
    /// The amount of immutable samplers does not match the array size of the binding.
    #[error("Binding {binding} declares {expected} descriptors but {actual} immutable samplers were given.")]
    ImmutableSamplerCount { binding: u32, expected: u32, actual: u32 },
    /// A variable descriptor count binding must be the binding with the highest index.
    #[error("Variable descriptor count binding {0} is not the highest binding in the layout.")]
    VariableCountNotLast(u32),
    /// Only a single binding per layout may have a variable descriptor count.
    #[error("More than one binding uses a variable descriptor count.")]
    MultipleVariableCount,
    /// A push constant range is empty or not aligned to 4 bytes.
    #[error("Push constant range at offset {offset} with size {size} is invalid.")]
    InvalidPushConstantRange { offset: u32, size: u32 },
    /// Two push constant ranges overlap for at least one shader stage.
    #[error("Push constant ranges at offsets {0} and {1} overlap.")]
    OverlappingPushConstants(u32, u32),
    /// The same push constant range was specified twice.
    #[error("Push constant range at offset {0} was specified twice.")]
    DuplicatePushConstantRange(u32),
    /// Inline uniform block writes must start at and span a multiple of 4 bytes.
    #[error("Inline uniform block write at offset {offset} with size {size} is not 4-byte aligned.")]
    UnalignedInlineUniformBlock { offset: u32, size: u32 },
    /// Tried to obtain a pipeline handle, layout or shader information from a proxy pipeline.
    #[error("Pipeline {0} is a proxy pipeline and cannot be queried.")]
    ProxyPipelineQuery(PipelineId),
    /// Pipeline id was never registered, or was deleted.
    #[error("Pipeline {0} not found.")]
    PipelineNotFound(PipelineId),
    /// The base pipeline of a derivative does not exist.
    #[error("Base pipeline {0} does not exist.")]
    InvalidBasePipeline(PipelineId),
    /// The base pipeline of a derivative was not created with `ALLOW_DERIVATIVES`.
    #[error("Base pipeline {0} does not allow derivatives.")]
    BaseNotDerivable(PipelineId),
    /// All pipeline ids of this manager were used up.
    #[error("Pipeline id space exhausted.")]
    PipelineIdsExhausted,
    /// The pipeline does not have a shader attached for the requested stage.
    #[error("Shader stage {0:?} is not valid here.")]
    InvalidShaderStage(ShaderStage),
    /// A required shader stage was not attached.
    #[error("Pipeline requires a {0:?} shader stage.")]
    MissingShaderStage(ShaderStage),
    /// A shader stage was attached more than once.
    #[error("Shader stage {0:?} was attached more than once.")]
    DuplicateShaderStage(ShaderStage),
    /// Tried to add a vertex attribute at a location that is already in use.
    #[error("Vertex attribute location {0} is used more than once.")]
    DuplicateVertexLocation(u32),
    /// Vertex attributes sharing a binding must agree on stride and input rate.
    #[error("Vertex binding {0} was declared with conflicting stride or input rate.")]
    VertexBindingMismatch(u32),
    /// The device was created without a pipeline cache, but a manager asked to use it.
    #[error("Device has no pipeline cache.")]
    NoPipelineCache,
    /// Descriptor set group slot index out of range.
    #[error("Descriptor set slot {0} does not exist.")]
    SlotOutOfRange(u32),
    /// Descriptor set group slot has no layout, so nothing can be bound to it.
    #[error("Descriptor set slot {0} has no layout.")]
    EmptySlot(u32),
    /// The layout of the slot has no binding with a variable descriptor count.
    #[error("Descriptor set slot {0} has no variable descriptor count binding.")]
    NoVariableCountBinding(u32),
    /// The descriptor set layout does not declare the given binding.
    #[error("Binding {0} does not exist in the descriptor set layout.")]
    NoSuchBinding(u32),
    /// Written descriptor does not match the type declared by the binding.
    #[error("Binding {binding} expects {expected:?} descriptors, got {actual:?}.")]
    DescriptorTypeMismatch { binding: u32, expected: DescriptorKind, actual: DescriptorKind },
    /// Descriptor writes past the end of the binding array.
    #[error("Write to binding {binding} at [{first}, {end}) exceeds array size {size}.")]
    ArrayOutOfRange { binding: u32, first: u32, end: u32, size: u32 },
    /// Descriptor set groups that share layouts with a parent cannot change them.
    #[error("Cannot change layouts of a descriptor set group that derives from a parent group.")]
    DerivedGroupLayoutChange,
    /// Only one level of layout sharing between descriptor set groups is supported.
    #[error("A parent descriptor set group cannot itself have a parent.")]
    NestedParentGroup,
    /// A derived descriptor set group disagrees with its parent about releasable sets.
    #[error("Derived descriptor set group must match the releasable-sets setting of its parent.")]
    ReleaseableMismatch,
    /// Descriptor sets cannot be freed individually from this pool.
    #[error("Descriptor pool was not created with `FREE_DESCRIPTOR_SET`.")]
    SetsNotReleaseable,
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<(Vec<ash::vk::Pipeline>, ash::vk::Result)> for Error {
    fn from((_, result): (Vec<ash::vk::Pipeline>, ash::vk::Result)) -> Self {
        Error::VkError(result)
    }
}

/// Report a violated precondition. The error is logged and handed back for the caller to return.
pub(crate) fn precondition(err: Error) -> anyhow::Error {
    error!("Precondition violated: {err}");
    anyhow::Error::from(err)
}
