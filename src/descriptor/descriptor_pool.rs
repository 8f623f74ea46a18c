//! A descriptor pool is a fixed size block of descriptor storage that descriptor sets are allocated from.
//! Descriptor set groups size their private pool exactly from the layouts of their slots.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::device::ExtensionID;
use crate::core::error::precondition;
use crate::core::functions::DeviceFunctions;
use crate::descriptor::DescriptorKind;
use crate::pipeline::set_layout::DescriptorSetLayout;
use crate::util::sync::{Guarded, ObjectLock, ThreadingMode};
use crate::{Device, Error};

/// Defines how many descriptors of each type a descriptor pool can hold. For inline uniform blocks
/// the count is in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize(BTreeMap<DescriptorKind, u32>);

impl DescriptorPoolSize {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add room for `count` more descriptors of type `kind`. Saturates at `u32::MAX`, pool creation then
    /// reports the actual device limit.
    pub fn add(&mut self, kind: DescriptorKind, count: u32) {
        if count == 0 {
            return;
        }
        let total = self.0.entry(kind).or_default();
        *total = total.saturating_add(count);
    }

    /// Replace the amount of descriptors of type `kind`.
    pub fn set(&mut self, kind: DescriptorKind, count: u32) {
        if count == 0 {
            self.0.remove(&kind);
        } else {
            self.0.insert(kind, count);
        }
    }

    /// Amount of descriptors of this type.
    pub fn get(&self, kind: DescriptorKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DescriptorKind, u32)> + '_ {
        self.0.iter().map(|(kind, count)| (*kind, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for DescriptorPoolSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut result = writeln!(f, "DescriptorPoolSize (");
        for (kind, size) in &self.0 {
            result = result.and_then(|_| writeln!(f, "{kind:?} => {size}"))
        }
        result.and_then(|_| write!(f, ")"))
    }
}

/// Everything needed to create a descriptor pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorPoolCreateInfo {
    /// Maximum amount of sets that can be allocated at the same time.
    pub max_sets: u32,
    pub sizes: DescriptorPoolSize,
    /// `FREE_DESCRIPTOR_SET` allows freeing sets individually, `UPDATE_AFTER_BIND` is required for layouts
    /// with update-after-bind bindings.
    pub flags: vk::DescriptorPoolCreateFlags,
    /// Maximum amount of inline uniform block bindings over all sets.
    pub inline_uniform_block_bindings: u32,
}

type ResetCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct PoolState {
    allocated: usize,
    subscribers: Vec<ResetCallback>,
}

/// Memory pool for descriptor sets.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorPool {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    handle: vk::DescriptorPool,
    info: DescriptorPoolCreateInfo,
    #[derivative(Debug = "ignore")]
    state: Guarded<PoolState>,
    /// Held across allocation, and across a reset together with its notifications.
    lock: ObjectLock,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    /// # Errors
    /// - Fails with [`Error::ExtensionNotSupported`] if the pool uses update-after-bind without
    ///   [`ExtensionID::DescriptorIndexing`], or inline uniform blocks without [`ExtensionID::InlineUniformBlock`].
    /// - Fails if the driver cannot create the pool.
    pub fn new(device: &Device, info: DescriptorPoolCreateInfo, mode: ThreadingMode) -> Result<Self> {
        if info.flags.contains(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            device.require_extension(ExtensionID::DescriptorIndexing)?;
        }
        if info.sizes.get(DescriptorKind::InlineUniformBlock) > 0 || info.inline_uniform_block_bindings > 0 {
            device.require_extension(ExtensionID::InlineUniformBlock)?;
        }
        let fns = device.functions().clone();
        let handle = fns.create_descriptor_pool(&info).map_err(Error::from)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorPool {handle:p}");
        Ok(Self {
            fns,
            handle,
            info,
            state: Guarded::new(mode, PoolState::default()),
            lock: ObjectLock::new(mode),
        })
    }

    /// Get the raw Vulkan handle of this descriptor pool
    /// # Safety
    /// Sets must not be allocated from or returned to the handle directly.
    pub unsafe fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub fn info(&self) -> &DescriptorPoolCreateInfo {
        &self.info
    }

    /// Whether sets can be returned to this pool individually.
    pub fn is_releaseable(&self) -> bool {
        self.info.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
    }

    /// Amount of sets currently allocated from this pool.
    pub fn allocated_count(&self) -> usize {
        self.state.with(|state| state.allocated)
    }

    /// Allocate one set per layout in a single call. `variable_counts` is either empty, or has one entry per
    /// layout giving the descriptor count of its variable count binding.
    /// # Errors
    /// The Vulkan result is passed through unchanged, so running out of pool memory can be told apart from fragmentation.
    pub fn allocate(&self, layouts: &[&DescriptorSetLayout], variable_counts: &[Option<u32>]) -> Result<Vec<vk::DescriptorSet>> {
        // SAFETY: The caller keeps the layouts alive for the duration of this call.
        let handles = layouts.iter().map(|layout| unsafe { layout.handle() }).collect::<Vec<_>>();
        let counts = variable_counts
            .iter()
            .any(Option::is_some)
            .then(|| variable_counts.iter().map(|count| count.unwrap_or_default()).collect::<Vec<_>>());
        let _guard = self.lock.lock();
        self.state.with(|state| -> Result<Vec<vk::DescriptorSet>> {
            let sets = self
                .fns
                .allocate_descriptor_sets(self.handle, handles.as_slice(), counts.as_deref())
                .map_err(Error::from)?;
            state.allocated += sets.len();
            Ok(sets)
        })
    }

    /// Return sets to the pool.
    /// # Errors
    /// Fails with [`Error::SetsNotReleaseable`] if the pool was not created with `FREE_DESCRIPTOR_SET`.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> Result<()> {
        if !self.is_releaseable() {
            return Err(precondition(Error::SetsNotReleaseable));
        }
        let _guard = self.lock.lock();
        self.state.with(|state| -> Result<()> {
            self.fns
                .free_descriptor_sets(self.handle, sets)
                .map_err(Error::from)?;
            state.allocated = state.allocated.saturating_sub(sets.len());
            Ok(())
        })
    }

    /// Return all sets to the pool. Every subscriber registered through [`DescriptorPool::on_reset()`] is
    /// notified before this returns.
    pub fn reset(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let subscribers = self.state.with(|state| -> Result<Vec<ResetCallback>> {
            self.fns.reset_descriptor_pool(self.handle).map_err(Error::from)?;
            state.allocated = 0;
            Ok(state.subscribers.clone())
        })?;
        for notify in subscribers {
            notify();
        }
        Ok(())
    }

    /// Register a callback that is invoked every time the pool is reset.
    pub fn on_reset(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state.with(|state| state.subscribers.push(Arc::new(callback)));
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorPool {:p}", self.handle);
        self.fns.destroy_descriptor_pool(self.handle);
    }
}
