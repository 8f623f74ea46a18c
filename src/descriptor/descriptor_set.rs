//! Typed descriptor contents, and the per-set record used to replay them into reallocated sets.

use ash::vk;

use crate::descriptor::DescriptorKind;

/// A range inside a buffer that is bound to a uniform or storage buffer binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

impl BufferRange {
    pub fn new(buffer: vk::Buffer, offset: vk::DeviceSize, range: vk::DeviceSize) -> Self {
        Self {
            buffer,
            offset,
            range,
        }
    }

    /// Bind the entire buffer.
    pub fn whole(buffer: vk::Buffer) -> Self {
        Self::new(buffer, 0, vk::WHOLE_SIZE)
    }
}

/// An image view in a specific layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageBinding {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

impl ImageBinding {
    pub fn new(view: vk::ImageView, layout: vk::ImageLayout) -> Self {
        Self {
            view,
            layout,
        }
    }
}

/// The contents of a single descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorItem {
    Sampler(vk::Sampler),
    /// The sampler is ignored if the binding uses immutable samplers.
    CombinedImageSampler(ImageBinding, vk::Sampler),
    SampledImage(ImageBinding),
    StorageImage(ImageBinding),
    UniformTexelBuffer(vk::BufferView),
    StorageTexelBuffer(vk::BufferView),
    UniformBuffer(BufferRange),
    StorageBuffer(BufferRange),
    DynamicUniformBuffer(BufferRange),
    DynamicStorageBuffer(BufferRange),
    InputAttachment(ImageBinding),
}

impl DescriptorItem {
    /// The descriptor type of the binding this item can be written to.
    pub fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorItem::Sampler(_) => DescriptorKind::Sampler,
            DescriptorItem::CombinedImageSampler(_, _) => DescriptorKind::CombinedImageSampler,
            DescriptorItem::SampledImage(_) => DescriptorKind::SampledImage,
            DescriptorItem::StorageImage(_) => DescriptorKind::StorageImage,
            DescriptorItem::UniformTexelBuffer(_) => DescriptorKind::UniformTexelBuffer,
            DescriptorItem::StorageTexelBuffer(_) => DescriptorKind::StorageTexelBuffer,
            DescriptorItem::UniformBuffer(_) => DescriptorKind::UniformBuffer,
            DescriptorItem::StorageBuffer(_) => DescriptorKind::StorageBuffer,
            DescriptorItem::DynamicUniformBuffer(_) => DescriptorKind::DynamicUniformBuffer,
            DescriptorItem::DynamicStorageBuffer(_) => DescriptorKind::DynamicStorageBuffer,
            DescriptorItem::InputAttachment(_) => DescriptorKind::InputAttachment,
        }
    }
}

/// Contents of a [`DescriptorWrite`].
#[derive(Debug, Copy, Clone)]
pub enum WriteContents<'a> {
    /// One item per array element, starting at `first_element`.
    Items(&'a [DescriptorItem]),
    /// Raw bytes, starting at byte offset `first_element`.
    InlineUniformBlock(&'a [u8]),
}

/// A single descriptor update, passed to [`DeviceFunctions::update_descriptor_sets()`](crate::core::functions::DeviceFunctions::update_descriptor_sets).
#[derive(Debug, Copy, Clone)]
pub struct DescriptorWrite<'a> {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    /// First array element, or byte offset for inline uniform blocks.
    pub first_element: u32,
    pub kind: DescriptorKind,
    pub contents: WriteContents<'a>,
}

impl DescriptorWrite<'_> {
    /// Amount of descriptors written, or bytes for inline uniform blocks.
    pub fn count(&self) -> u32 {
        match self.contents {
            WriteContents::Items(items) => items.len() as u32,
            WriteContents::InlineUniformBlock(data) => data.len() as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RecordedContents {
    Items(Vec<DescriptorItem>),
    InlineUniformBlock(Vec<u8>),
}

impl RecordedContents {
    fn len(&self) -> u32 {
        match self {
            RecordedContents::Items(items) => items.len() as u32,
            RecordedContents::InlineUniformBlock(data) => data.len() as u32,
        }
    }

    fn truncate(&mut self, len: u32) {
        match self {
            RecordedContents::Items(items) => items.truncate(len as usize),
            RecordedContents::InlineUniformBlock(data) => data.truncate(len as usize),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedWrite {
    binding: u32,
    first_element: u32,
    kind: DescriptorKind,
    contents: RecordedContents,
}

impl RecordedWrite {
    fn end(&self) -> u32 {
        self.first_element + self.contents.len()
    }

    fn as_write(&self, set: vk::DescriptorSet) -> DescriptorWrite<'_> {
        DescriptorWrite {
            set,
            binding: self.binding,
            first_element: self.first_element,
            kind: self.kind,
            contents: match &self.contents {
                RecordedContents::Items(items) => WriteContents::Items(items.as_slice()),
                RecordedContents::InlineUniformBlock(data) => WriteContents::InlineUniformBlock(data.as_slice()),
            },
        }
    }
}

/// Everything written to one descriptor set, in write order. Replaying the record into a fresh set
/// reproduces the contents of the old one.
#[derive(Debug, Clone, Default)]
pub(crate) struct DescriptorSetRecord {
    writes: Vec<RecordedWrite>,
}

impl DescriptorSetRecord {
    pub fn record_items(&mut self, binding: u32, first_element: u32, kind: DescriptorKind, items: &[DescriptorItem]) {
        self.push(RecordedWrite {
            binding,
            first_element,
            kind,
            contents: RecordedContents::Items(items.to_vec()),
        });
    }

    pub fn record_inline_uniform_block(&mut self, binding: u32, offset: u32, data: &[u8]) {
        self.push(RecordedWrite {
            binding,
            first_element: offset,
            kind: DescriptorKind::InlineUniformBlock,
            contents: RecordedContents::InlineUniformBlock(data.to_vec()),
        });
    }

    fn push(&mut self, write: RecordedWrite) {
        // Older writes that are completely overwritten no longer affect the set.
        self.writes.retain(|old| {
            old.binding != write.binding || old.first_element < write.first_element || old.end() > write.end()
        });
        self.writes.push(write);
    }

    /// Drop everything written at or past `count` in `binding`, after its variable descriptor count shrunk.
    pub fn truncate_binding(&mut self, binding: u32, count: u32) {
        self.writes
            .retain(|write| write.binding != binding || write.first_element < count);
        for write in self.writes.iter_mut().filter(|write| write.binding == binding) {
            let len = count - write.first_element;
            write.contents.truncate(len);
        }
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// All recorded writes, targeting `set`.
    pub fn writes(&self, set: vk::DescriptorSet) -> Vec<DescriptorWrite<'_>> {
        self.writes.iter().map(|write| write.as_write(set)).collect()
    }
}

