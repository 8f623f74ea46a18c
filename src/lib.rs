//! Deduplicating Vulkan pipeline and descriptor management.
//!
//! vkbake owns the objects that sit between shader code and command recording: descriptor set layouts,
//! pipeline layouts, descriptor pools and sets, and pipelines. Layouts are immutable values that are
//! baked once per unique description and shared by reference counting. Descriptor set groups size their
//! own pools and re-create their sets whenever a layout changes. Pipelines are registered with a
//! [`PipelineManager`](crate::pipeline::manager::PipelineManager) and baked in batches on first use.
//!
//! # Example
//!
//! ```ignore
//! use vkbake::prelude::*;
//!
//! // Wrap an existing ash device.
//! let settings = DeviceSettingsBuilder::new()
//!     .threading(ThreadingMode::MultiThreaded)
//!     .extension(ExtensionID::DescriptorIndexing)
//!     .build();
//! let device = Device::from_ash(&instance, ash_device, &settings)?;
//!
//! // Describe a set layout. Equal descriptions share one VkDescriptorSetLayout.
//! let layout = DescriptorSetLayoutCreateInfo::builder()
//!     .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::VERTEX)?
//!     .build()?;
//!
//! // A group of descriptor sets with a private, exactly sized pool.
//! let group = DescriptorSetGroup::new(&device, DescriptorSetGroupCreateInfo {
//!     layouts: vec![Some(layout)],
//!     ..Default::default()
//! })?;
//! group.set_binding_item(0, 0, 0, DescriptorItem::UniformBuffer(BufferRange::whole(buffer)))?;
//! let set = group.descriptor_set(0)?;
//! ```
//! For further example code, check out the following modules
//! - [`pipeline`] for layouts and pipeline creation.
//! - [`descriptor`] for descriptor pools and descriptor set groups.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod core;
pub mod descriptor;
pub mod pipeline;
pub mod util;

static_assertions::assert_impl_all!(Device: Send, Sync);
static_assertions::assert_impl_all!(pipeline::manager::PipelineManager: Send, Sync);
static_assertions::assert_impl_all!(descriptor::set_group::DescriptorSetGroup: Send, Sync);
static_assertions::assert_impl_all!(descriptor::descriptor_pool::DescriptorPool: Send, Sync);
static_assertions::assert_impl_all!(pipeline::set_layout::DescriptorSetLayout: Send, Sync);
static_assertions::assert_impl_all!(pipeline::pipeline_layout::PipelineLayout: Send, Sync);
