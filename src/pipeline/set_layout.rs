//! Descriptor set layout descriptions, and the manager that deduplicates the baked layouts.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::error::precondition;
use crate::core::functions::DeviceFunctions;
use crate::descriptor::DescriptorKind;
use crate::util::cache::{Cache, Resource, Shared};
use crate::util::sync::ThreadingMode;
use crate::Error;

/// A single binding inside a descriptor set layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    kind: DescriptorKind,
    array_size: u32,
    stages: vk::ShaderStageFlags,
    immutable_samplers: Option<Vec<vk::Sampler>>,
    flags: vk::DescriptorBindingFlags,
}

impl DescriptorSetLayoutBinding {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Number of descriptors in this binding. For inline uniform blocks this is the size in bytes.
    /// A size of zero declares a reserved binding that consumes no descriptors. For variable count
    /// bindings this is the upper bound.
    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    pub fn stages(&self) -> vk::ShaderStageFlags {
        self.stages
    }

    pub fn immutable_samplers(&self) -> Option<&[vk::Sampler]> {
        self.immutable_samplers.as_deref()
    }

    pub fn flags(&self) -> vk::DescriptorBindingFlags {
        self.flags
    }

    pub fn is_variable_count(&self) -> bool {
        self.flags.contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
    }

    pub fn is_update_after_bind(&self) -> bool {
        self.flags.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND)
    }
}

/// Describes a descriptor set layout. Two descriptions are equal if all their bindings are equal.
/// Use [`DescriptorSetLayoutCreateInfo::builder()`] to construct one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutCreateInfo {
    bindings: BTreeMap<u32, DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutCreateInfo {
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    /// The placeholder layout used for empty slots: one sampler at binding 0, visible to no stages.
    pub fn dummy() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            0,
            DescriptorSetLayoutBinding {
                kind: DescriptorKind::Sampler,
                array_size: 1,
                stages: vk::ShaderStageFlags::empty(),
                immutable_samplers: None,
                flags: vk::DescriptorBindingFlags::empty(),
            },
        );
        Self {
            bindings,
        }
    }

    /// All bindings, ordered by binding index.
    pub fn bindings(&self) -> impl Iterator<Item = (u32, &DescriptorSetLayoutBinding)> {
        self.bindings.iter().map(|(index, binding)| (*index, binding))
    }

    pub fn binding(&self, index: u32) -> Option<&DescriptorSetLayoutBinding> {
        self.bindings.get(&index)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// The binding with a variable descriptor count, if any. This is always the last binding.
    pub fn variable_count_binding(&self) -> Option<(u32, &DescriptorSetLayoutBinding)> {
        self.bindings
            .iter()
            .next_back()
            .filter(|(_, binding)| binding.is_variable_count())
            .map(|(index, binding)| (*index, binding))
    }

    /// Whether the layout must be created with `UPDATE_AFTER_BIND_POOL`.
    pub fn is_update_after_bind(&self) -> bool {
        self.bindings.values().any(|binding| binding.is_update_after_bind())
    }
}

/// Builder for [`DescriptorSetLayoutCreateInfo`]. Invalid bindings are rejected as soon as they are added, the
/// variable descriptor count rules are verified in [`DescriptorSetLayoutBuilder::build()`].
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    inner: DescriptorSetLayoutCreateInfo,
}

impl DescriptorSetLayoutBuilder {
    /// Add a binding without any binding flags.
    pub fn add_binding(self, index: u32, kind: DescriptorKind, array_size: u32, stages: vk::ShaderStageFlags) -> Result<Self> {
        self.add_binding_with_flags(index, kind, array_size, stages, vk::DescriptorBindingFlags::empty())
    }

    /// Add a binding with binding flags such as `UPDATE_AFTER_BIND` or `VARIABLE_DESCRIPTOR_COUNT`.
    pub fn add_binding_with_flags(
        self,
        index: u32,
        kind: DescriptorKind,
        array_size: u32,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Result<Self> {
        self.insert(
            index,
            DescriptorSetLayoutBinding {
                kind,
                array_size,
                stages,
                immutable_samplers: None,
                flags,
            },
        )
    }

    /// Add a sampler or combined image sampler binding with one immutable sampler per array element.
    pub fn add_binding_with_samplers(
        self,
        index: u32,
        kind: DescriptorKind,
        array_size: u32,
        stages: vk::ShaderStageFlags,
        samplers: Vec<vk::Sampler>,
    ) -> Result<Self> {
        if !kind.accepts_immutable_samplers() {
            return Err(precondition(Error::ImmutableSamplersNotAllowed(index, kind)));
        }
        if samplers.len() != array_size as usize {
            return Err(precondition(Error::ImmutableSamplerCount {
                binding: index,
                expected: array_size,
                actual: samplers.len() as u32,
            }));
        }
        self.insert(
            index,
            DescriptorSetLayoutBinding {
                kind,
                array_size,
                stages,
                immutable_samplers: Some(samplers),
                flags: vk::DescriptorBindingFlags::empty(),
            },
        )
    }

    fn insert(mut self, index: u32, binding: DescriptorSetLayoutBinding) -> Result<Self> {
        if self.inner.bindings.contains_key(&index) {
            return Err(precondition(Error::DuplicateBinding(index)));
        }
        self.inner.bindings.insert(index, binding);
        Ok(self)
    }

    /// Verify the variable descriptor count rules and return the finished description.
    pub fn build(self) -> Result<DescriptorSetLayoutCreateInfo> {
        let mut variable = self
            .inner
            .bindings
            .iter()
            .filter(|(_, binding)| binding.is_variable_count())
            .map(|(index, _)| *index);
        if let Some(index) = variable.next() {
            if variable.next().is_some() {
                return Err(precondition(Error::MultipleVariableCount));
            }
            let last = self.inner.bindings.keys().next_back().copied();
            if last != Some(index) {
                return Err(precondition(Error::VariableCountNotLast(index)));
            }
        }
        Ok(self.inner)
    }
}

/// A baked Vulkan descriptor set layout. This is a managed resource, only obtainable through
/// [`DescriptorSetLayoutManager::get_layout()`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BakedDescriptorSetLayout {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    handle: vk::DescriptorSetLayout,
    info: DescriptorSetLayoutCreateInfo,
}

/// Shared handle to a baked descriptor set layout.
pub type DescriptorSetLayout = Shared<BakedDescriptorSetLayout>;

impl BakedDescriptorSetLayout {
    /// Get unsafe access to the internal `VkDescriptorSetLayout`.
    /// # Safety
    /// The handle must not be destroyed, and is only valid while a [`DescriptorSetLayout`] to it is alive.
    pub unsafe fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    /// The description this layout was baked from.
    pub fn info(&self) -> &DescriptorSetLayoutCreateInfo {
        &self.info
    }
}

impl Resource for BakedDescriptorSetLayout {
    type Key = DescriptorSetLayoutCreateInfo;
    type ExtraParams<'a> = &'a Arc<dyn DeviceFunctions>;

    fn create(key: &Self::Key, fns: Self::ExtraParams<'_>) -> Result<Self> {
        let handle = fns.create_descriptor_set_layout(key).map_err(Error::from)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {handle:p}");
        Ok(Self {
            fns: fns.clone(),
            handle,
            info: key.clone(),
        })
    }

    fn key(&self) -> &Self::Key {
        &self.info
    }
}

impl Drop for BakedDescriptorSetLayout {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorSetLayout {:p}", self.handle);
        self.fns.destroy_descriptor_set_layout(self.handle);
    }
}

/// Device-wide cache of descriptor set layouts. Value-equal descriptions always resolve to the same baked
/// layout, which lives for as long as any [`DescriptorSetLayout`] handle to it does.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct DescriptorSetLayoutManager {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    #[derivative(Debug = "ignore")]
    cache: Cache<BakedDescriptorSetLayout>,
}

impl DescriptorSetLayoutManager {
    pub fn new(fns: Arc<dyn DeviceFunctions>, mode: ThreadingMode) -> Self {
        Self {
            fns,
            cache: Cache::new(mode),
        }
    }

    /// Get a shared handle to the layout described by `info`, baking it if no equal layout is alive.
    /// # Errors
    /// Fails if baking the layout fails. No entry is added in that case.
    pub fn get_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> Result<DescriptorSetLayout> {
        self.cache.get_or_create(info, &self.fns)
    }

    /// Amount of unique layouts currently alive.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
