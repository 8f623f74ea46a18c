//! This module handles everything related to descriptor sets.
//!
//! The main entry point is the [`DescriptorSetGroup`](set_group::DescriptorSetGroup). A group owns a private
//! [`DescriptorPool`](descriptor_pool::DescriptorPool) that is sized exactly for the layouts of its slots,
//! and one descriptor set per slot allocated from that pool.
//!
//! # Example
//!
//! ```ignore
//! use vkbake::prelude::*;
//!
//! let layout = DescriptorSetLayoutCreateInfo::builder()
//!     // layout(set = 0, binding = 0) uniform Camera { ... };
//!     .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::VERTEX)?
//!     .build()?;
//! let group = DescriptorSetGroup::new(&device, DescriptorSetGroupCreateInfo {
//!     layouts: vec![Some(layout)],
//!     ..Default::default()
//! })?;
//! group.set_binding_item(0, 0, 0, DescriptorItem::UniformBuffer(BufferRange::whole(camera_buffer)))?;
//! let set = group.descriptor_set(0)?;
//! ```

use ash::vk;

use crate::util::to_vk::IntoVulkanType;

pub mod descriptor_pool;
pub mod descriptor_set;
pub mod set_group;

/// The closed set of descriptor types supported by the descriptor managers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorKind {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    DynamicUniformBuffer,
    DynamicStorageBuffer,
    InputAttachment,
    /// For inline uniform blocks the array size of a binding is its size in bytes.
    InlineUniformBlock,
}

impl DescriptorKind {
    /// Whether bindings of this type may carry immutable samplers.
    pub fn accepts_immutable_samplers(&self) -> bool {
        matches!(self, DescriptorKind::Sampler | DescriptorKind::CombinedImageSampler)
    }
}

impl IntoVulkanType for DescriptorKind {
    type Output = vk::DescriptorType;

    fn into_vulkan(self) -> Self::Output {
        match self {
            DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            DescriptorKind::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorKind::DynamicStorageBuffer => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            DescriptorKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
            DescriptorKind::InlineUniformBlock => vk::DescriptorType::INLINE_UNIFORM_BLOCK,
        }
    }
}
