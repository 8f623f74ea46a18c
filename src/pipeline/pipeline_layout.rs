//! Wrapper structs around `VkPipelineLayout` objects, and the manager that deduplicates them.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::error::precondition;
use crate::core::functions::DeviceFunctions;
use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo, DescriptorSetLayoutManager};
use crate::util::cache::{Cache, Resource, Shared};
use crate::util::sync::ThreadingMode;
use crate::util::to_vk::AsVulkanType;
use crate::Error;

/// Defines a range of Vulkan push constants.
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Shader stages where this push constant range is used
    pub stage_flags: vk::ShaderStageFlags,
    /// Offset into the global push constant block of this range
    pub offset: u32,
    /// Size of this push constant range
    pub size: u32,
}

impl PushConstantRange {
    pub fn new(offset: u32, size: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self {
            stage_flags,
            offset,
            size,
        }
    }

    fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.stage_flags.intersects(other.stage_flags) && self.offset < other.end() && other.offset < self.end()
    }
}

impl PartialOrd for PushConstantRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PushConstantRange {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.offset, self.size, self.stage_flags.as_raw()).cmp(&(other.offset, other.size, other.stage_flags.as_raw()))
    }
}

impl AsVulkanType for PushConstantRange {
    type Output = vk::PushConstantRange;

    fn as_vulkan(&self) -> Self::Output {
        vk::PushConstantRange {
            stage_flags: self.stage_flags,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Define a pipeline layout: an ordered list of descriptor set layouts, and a set of push constant ranges.
/// A `None` slot is filled with the device's dummy layout when baked, so set indices stay dense.
///
/// Two descriptions are equal if their set layouts are equal position by position and they contain the
/// same push constant ranges, regardless of the order they were given in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCreateInfo {
    set_layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>,
    push_constants: BTreeSet<PushConstantRange>,
}

impl PipelineLayoutCreateInfo {
    /// Create a pipeline layout description.
    /// # Errors
    /// - Fails if a push constant range is empty or not 4-byte aligned.
    /// - Fails if a push constant range is given twice, or two ranges overlap for a common stage.
    pub fn new(set_layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>, push_constants: &[PushConstantRange]) -> Result<Self> {
        let mut ranges = BTreeSet::new();
        for range in push_constants {
            if range.size == 0 || range.offset % 4 != 0 || range.size % 4 != 0 {
                return Err(precondition(Error::InvalidPushConstantRange {
                    offset: range.offset,
                    size: range.size,
                }));
            }
            if ranges.contains(range) {
                return Err(precondition(Error::DuplicatePushConstantRange(range.offset)));
            }
            if let Some(other) = ranges.iter().find(|other| range.overlaps(other)) {
                return Err(precondition(Error::OverlappingPushConstants(other.offset, range.offset)));
            }
            ranges.insert(*range);
        }
        Ok(Self {
            set_layouts,
            push_constants: ranges,
        })
    }

    pub fn set_layouts(&self) -> &[Option<DescriptorSetLayoutCreateInfo>] {
        self.set_layouts.as_slice()
    }

    /// Push constant ranges, ordered by offset.
    pub fn push_constants(&self) -> impl Iterator<Item = &PushConstantRange> {
        self.push_constants.iter()
    }
}

/// A fully built Vulkan pipeline layout. This is a managed resource, only obtainable through
/// [`PipelineLayoutManager::get_layout()`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BakedPipelineLayout {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    handle: vk::PipelineLayout,
    info: PipelineLayoutCreateInfo,
    set_layouts: Vec<DescriptorSetLayout>,
}

/// Shared handle to a baked pipeline layout.
pub type PipelineLayout = Shared<BakedPipelineLayout>;

impl BakedPipelineLayout {
    /// Get unsafe access to the internal `VkPipelineLayout`.
    /// # Safety
    /// The handle must not be destroyed, and is only valid while a [`PipelineLayout`] to it is alive.
    pub unsafe fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// The description this layout was baked from.
    pub fn info(&self) -> &PipelineLayoutCreateInfo {
        &self.info
    }

    /// The descriptor set layouts of this pipeline layout, one per set index. Empty slots refer to the
    /// dummy layout.
    pub fn set_layouts(&self) -> &[DescriptorSetLayout] {
        self.set_layouts.as_slice()
    }
}

impl Resource for BakedPipelineLayout {
    type Key = PipelineLayoutCreateInfo;
    type ExtraParams<'a> = (&'a Arc<dyn DeviceFunctions>, &'a DescriptorSetLayoutManager);

    fn create(key: &Self::Key, (fns, set_layout_manager): Self::ExtraParams<'_>) -> Result<Self> {
        let dummy = DescriptorSetLayoutCreateInfo::dummy();
        let set_layouts = key
            .set_layouts
            .iter()
            .map(|info| set_layout_manager.get_layout(info.as_ref().unwrap_or(&dummy)))
            .collect::<Result<Vec<_>>>()?;

        // SAFETY: `set_layouts` keeps every referenced layout alive for the lifetime of the pipeline layout.
        let handles = set_layouts.iter().map(|layout| unsafe { layout.handle() }).collect::<Vec<_>>();
        let pc = key.push_constants.iter().map(|pc| pc.as_vulkan()).collect::<Vec<_>>();
        let handle = fns.create_pipeline_layout(handles.as_slice(), pc.as_slice()).map_err(Error::from)?;

        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipelineLayout {handle:p}");

        Ok(Self {
            fns: fns.clone(),
            handle,
            info: key.clone(),
            set_layouts,
        })
    }

    fn key(&self) -> &Self::Key {
        &self.info
    }
}

impl Drop for BakedPipelineLayout {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipelineLayout {:p}", self.handle);
        self.fns.destroy_pipeline_layout(self.handle);
    }
}

/// Device-wide cache of pipeline layouts. Set layouts are resolved through the device's
/// [`DescriptorSetLayoutManager`].
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct PipelineLayoutManager {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    set_layouts: DescriptorSetLayoutManager,
    #[derivative(Debug = "ignore")]
    cache: Cache<BakedPipelineLayout>,
}

impl PipelineLayoutManager {
    pub fn new(fns: Arc<dyn DeviceFunctions>, set_layouts: DescriptorSetLayoutManager, mode: ThreadingMode) -> Self {
        Self {
            fns,
            set_layouts,
            cache: Cache::new(mode),
        }
    }

    /// Get a shared handle to the pipeline layout with these set layouts and push constant ranges.
    /// # Errors
    /// - Fails if the push constant ranges are invalid, see [`PipelineLayoutCreateInfo::new()`].
    /// - Fails if baking any of the set layouts or the pipeline layout fails.
    pub fn get_layout(
        &self,
        set_layouts: &[Option<DescriptorSetLayoutCreateInfo>],
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayout> {
        let info = PipelineLayoutCreateInfo::new(set_layouts.to_vec(), push_constants)?;
        self.get_layout_for(&info)
    }

    /// Same as [`PipelineLayoutManager::get_layout()`], for an already validated description.
    pub fn get_layout_for(&self, info: &PipelineLayoutCreateInfo) -> Result<PipelineLayout> {
        self.cache.get_or_create(info, (&self.fns, &self.set_layouts))
    }

    /// Amount of unique pipeline layouts currently alive.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
