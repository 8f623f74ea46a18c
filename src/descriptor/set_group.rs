//! Descriptor set groups own a list of descriptor set slots, the private pool they are allocated from, and a
//! record of everything written to them.
//!
//! The pool is sized from a census of the slot layouts the first time a set is needed, and rebuilt whenever a layout,
//! a variable descriptor count or the overhead changes. Rebuilding reallocates every set and replays the recorded
//! writes into the new sets, so a set obtained through [`DescriptorSetGroup::descriptor_set()`] always holds the
//! latest contents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::error::precondition;
use crate::descriptor::descriptor_pool::{DescriptorPool, DescriptorPoolCreateInfo, DescriptorPoolSize};
use crate::descriptor::descriptor_set::{DescriptorItem, DescriptorSetRecord, DescriptorWrite, WriteContents};
use crate::descriptor::DescriptorKind;
use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::util::sync::{Guarded, ThreadingMode};
use crate::{Device, Error};

/// Create info for a [`DescriptorSetGroup`].
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetGroupCreateInfo {
    /// One entry per slot. Empty slots are filled with the device's dummy set.
    pub layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>,
    /// Allow releasing sets individually with [`DescriptorSetGroup::release_set()`].
    pub releaseable_sets: bool,
    /// Extra flags for the descriptor pool.
    pub pool_flags: vk::DescriptorPoolCreateFlags,
    /// Extra descriptors reserved in the pool on top of what the slots need.
    pub overhead: DescriptorPoolSize,
    pub threading: ThreadingMode,
}

#[derive(Debug)]
struct Slot {
    layout: Option<DescriptorSetLayout>,
    /// Descriptor count of the variable count binding. `None` uses the upper bound from the layout.
    variable_count: Option<u32>,
    set: Option<vk::DescriptorSet>,
    record: DescriptorSetRecord,
}

impl Slot {
    fn new(layout: Option<DescriptorSetLayout>, variable_count: Option<u32>) -> Self {
        Self {
            layout,
            variable_count,
            set: None,
            record: DescriptorSetRecord::default(),
        }
    }

    /// Descriptor count to allocate for the variable count binding, if the layout has one.
    fn allocation_count(&self) -> Option<u32> {
        let layout = self.layout.as_ref()?;
        let (_, binding) = layout.info().variable_count_binding()?;
        Some(self.variable_count.unwrap_or(binding.array_size()))
    }
}

struct BakedPool {
    pool: Arc<DescriptorPool>,
    /// Cleared by the pool's reset notification.
    sets_valid: Arc<AtomicBool>,
}

struct GroupState {
    pool: Option<BakedPool>,
    slots: Vec<Slot>,
    overhead: DescriptorPoolSize,
    pool_dirty: bool,
}

/// Owns a descriptor pool and one descriptor set per slot. See the [module level documentation](crate::descriptor).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSetGroup {
    #[derivative(Debug = "ignore")]
    device: Device,
    releaseable: bool,
    derived: bool,
    pool_flags: vk::DescriptorPoolCreateFlags,
    threading: ThreadingMode,
    #[derivative(Debug = "ignore")]
    state: Guarded<GroupState>,
}

/// Compute the pool needed for `slots`. Empty slots are not counted.
fn census(
    slots: &[Slot],
    overhead: &DescriptorPoolSize,
    releaseable: bool,
    extra_flags: vk::DescriptorPoolCreateFlags,
) -> DescriptorPoolCreateInfo {
    let mut sizes = DescriptorPoolSize::new();
    let mut flags = extra_flags;
    let mut inline_uniform_block_bindings = 0;
    for slot in slots {
        let Some(layout) = &slot.layout else {
            continue;
        };
        for (_, binding) in layout.info().bindings() {
            let count = if binding.is_variable_count() {
                slot.variable_count.unwrap_or(binding.array_size())
            } else {
                binding.array_size()
            };
            if binding.is_update_after_bind() {
                flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
            }
            if binding.kind() == DescriptorKind::InlineUniformBlock && count > 0 {
                inline_uniform_block_bindings += 1;
            }
            sizes.add(binding.kind(), count);
        }
    }
    for (kind, count) in overhead.iter() {
        sizes.add(kind, count);
    }
    // Zero sized pools are not allowed.
    if sizes.is_empty() {
        sizes.add(DescriptorKind::Sampler, 1);
    }
    if releaseable {
        flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
    }
    DescriptorPoolCreateInfo {
        max_sets: (slots.len() as u32).max(1),
        sizes,
        flags,
        inline_uniform_block_bindings,
    }
}

impl DescriptorSetGroup {
    /// Create a new group. The layouts are resolved through the device's set layout manager right away,
    /// the pool and the sets are only created once they are first needed.
    pub fn new(device: &Device, info: DescriptorSetGroupCreateInfo) -> Result<Self> {
        let slots = info
            .layouts
            .iter()
            .map(|layout| -> Result<Slot> {
                let layout = layout.as_ref().map(|info| device.set_layouts().get_layout(info)).transpose()?;
                Ok(Slot::new(layout, None))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_slots(device.clone(), slots, info, false))
    }

    /// Create a group that shares the layouts of `parent`. The layouts of a derived group cannot be changed,
    /// so `info.layouts` must be empty.
    /// # Errors
    /// - Fails if `parent` is itself derived from another group.
    /// - Fails if `info.releaseable_sets` does not match the parent.
    pub fn with_parent(parent: &DescriptorSetGroup, info: DescriptorSetGroupCreateInfo) -> Result<Self> {
        if parent.derived {
            return Err(precondition(Error::NestedParentGroup));
        }
        if !info.layouts.is_empty() {
            return Err(precondition(Error::DerivedGroupLayoutChange));
        }
        if info.releaseable_sets != parent.releaseable {
            return Err(precondition(Error::ReleaseableMismatch));
        }
        let descriptions = parent.state.with(|state| {
            state
                .slots
                .iter()
                .map(|slot| (slot.layout.as_ref().map(|layout| layout.info().clone()), slot.variable_count))
                .collect::<Vec<_>>()
        });
        let set_layouts = parent.device.set_layouts();
        let slots = descriptions
            .into_iter()
            .map(|(layout, variable_count)| -> Result<Slot> {
                let layout = layout.as_ref().map(|info| set_layouts.get_layout(info)).transpose()?;
                Ok(Slot::new(layout, variable_count))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_slots(parent.device.clone(), slots, info, true))
    }

    fn from_slots(device: Device, slots: Vec<Slot>, info: DescriptorSetGroupCreateInfo, derived: bool) -> Self {
        Self {
            device,
            releaseable: info.releaseable_sets,
            derived,
            pool_flags: info.pool_flags,
            threading: info.threading,
            state: Guarded::new(
                info.threading,
                GroupState {
                    pool: None,
                    slots,
                    overhead: info.overhead,
                    pool_dirty: true,
                },
            ),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.state.with(|state| state.slots.len())
    }

    pub fn is_releaseable(&self) -> bool {
        self.releaseable
    }

    /// Whether this group shares the layouts of a parent group.
    pub fn is_derived(&self) -> bool {
        self.derived
    }

    /// The layout of a slot, or `None` for empty slots.
    pub fn layout(&self, slot: u32) -> Result<Option<DescriptorSetLayout>> {
        self.state.with(|state| -> Result<Option<DescriptorSetLayout>> {
            let index = Self::slot_index(state, slot)?;
            Ok(state.slots[index].layout.clone())
        })
    }

    /// The descriptor count used for the variable count binding of a slot.
    pub fn variable_descriptor_count(&self, slot: u32) -> Result<Option<u32>> {
        self.state.with(|state| -> Result<Option<u32>> {
            let index = Self::slot_index(state, slot)?;
            Ok(state.slots[index].allocation_count())
        })
    }

    /// Get the descriptor set of a slot, baking the pool and the sets first if needed. Empty slots return
    /// a set with the dummy layout.
    pub fn descriptor_set(&self, slot: u32) -> Result<vk::DescriptorSet> {
        self.state.with(|state| -> Result<vk::DescriptorSet> {
            let index = Self::slot_index(state, slot)?;
            let pool = self.ensure_baked(state)?;
            self.slot_set(&pool, &mut state.slots[index])
        })
    }

    /// The pool the sets of this group are allocated from. Bakes the pool if needed. Resetting the returned
    /// pool invalidates all sets of this group.
    pub fn descriptor_pool(&self) -> Result<Arc<DescriptorPool>> {
        self.state.with(|state| -> Result<Arc<DescriptorPool>> {
            match state.pool.as_ref() {
                Some(baked) if !state.pool_dirty => Ok(baked.pool.clone()),
                _ => self.bake_pool(state),
            }
        })
    }

    /// Replace the layout of a slot. Everything written to the slot is forgotten, and all sets are reallocated
    /// the next time one is requested.
    /// # Errors
    /// - Fails if this group is derived from a parent.
    /// - Fails if the slot does not exist, or baking the new layout fails.
    pub fn set_layout(&self, slot: u32, layout: Option<DescriptorSetLayoutCreateInfo>) -> Result<()> {
        if self.derived {
            return Err(precondition(Error::DerivedGroupLayoutChange));
        }
        self.state.with(|state| -> Result<()> {
            let index = Self::slot_index(state, slot)?;
            let layout = layout
                .as_ref()
                .map(|info| self.device.set_layouts().get_layout(info))
                .transpose()?;
            let slot = &mut state.slots[index];
            let unchanged = match (&slot.layout, &layout) {
                (Some(old), Some(new)) => DescriptorSetLayout::ptr_eq(old, new),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return Ok(());
            }
            slot.layout = layout;
            slot.variable_count = None;
            slot.set = None;
            slot.record.clear();
            state.pool_dirty = true;
            Ok(())
        })
    }

    /// Set the descriptor count of the variable count binding of a slot. Writes past the new count are forgotten.
    /// # Errors
    /// - Fails if the slot has no variable count binding.
    /// - Fails if `count` exceeds the upper bound declared in the layout.
    pub fn set_variable_descriptor_count(&self, slot: u32, count: u32) -> Result<()> {
        self.state.with(|state| -> Result<()> {
            let index = Self::slot_index(state, slot)?;
            let entry = &mut state.slots[index];
            let (binding, upper_bound) = entry
                .layout
                .as_ref()
                .and_then(|layout| layout.info().variable_count_binding())
                .map(|(binding, info)| (binding, info.array_size()))
                .ok_or_else(|| precondition(Error::NoVariableCountBinding(slot)))?;
            if count > upper_bound {
                return Err(precondition(Error::ArrayOutOfRange {
                    binding,
                    first: 0,
                    end: count,
                    size: upper_bound,
                }));
            }
            if entry.variable_count == Some(count) {
                return Ok(());
            }
            entry.variable_count = Some(count);
            entry.record.truncate_binding(binding, count);
            state.pool_dirty = true;
            Ok(())
        })
    }

    /// Reserve `count` descriptors of type `kind` in the pool on top of what the slots need.
    pub fn adjust_overhead(&self, kind: DescriptorKind, count: u32) {
        self.state.with(|state| {
            if state.overhead.get(kind) != count {
                state.overhead.set(kind, count);
                state.pool_dirty = true;
            }
        })
    }

    /// Reset the pool. All sets are invalidated, and reallocated with their recorded contents the next time
    /// one is requested.
    pub fn reset_pool(&self) -> Result<()> {
        self.state.with(|state| -> Result<()> {
            if let Some(baked) = &state.pool {
                baked.pool.reset()?;
            }
            for slot in &mut state.slots {
                slot.set = None;
            }
            Ok(())
        })
    }

    /// Return the set of a slot to the pool. The recorded contents are kept, and written to a new set the next
    /// time this slot's set is requested.
    /// # Errors
    /// Fails if the group was not created with `releaseable_sets`.
    pub fn release_set(&self, slot: u32) -> Result<()> {
        if !self.releaseable {
            return Err(precondition(Error::SetsNotReleaseable));
        }
        self.state.with(|state| -> Result<()> {
            let index = Self::slot_index(state, slot)?;
            let GroupState {
                pool,
                slots,
                ..
            } = state;
            let Some(baked) = pool.as_ref().filter(|baked| baked.sets_valid.load(Ordering::Acquire)) else {
                return Ok(());
            };
            if let Some(set) = slots[index].set {
                baked.pool.free(&[set])?;
                slots[index].set = None;
            }
            Ok(())
        })
    }

    /// Write a single descriptor.
    pub fn set_binding_item(&self, slot: u32, binding: u32, element: u32, item: DescriptorItem) -> Result<()> {
        self.set_binding_array_items(slot, binding, element, std::slice::from_ref(&item))
    }

    /// Write consecutive array elements of a binding, starting at `first_element`.
    /// # Errors
    /// - Fails if the slot is empty or the binding does not exist.
    /// - Fails if an item does not match the descriptor type of the binding.
    /// - Fails if the elements do not fit in the binding.
    pub fn set_binding_array_items(&self, slot: u32, binding: u32, first_element: u32, items: &[DescriptorItem]) -> Result<()> {
        self.state.with(|state| -> Result<()> {
            let index = Self::slot_index(state, slot)?;
            let (kind, size) = Self::binding_extent(&state.slots[index], slot, binding)?;
            if let Some(item) = items.iter().find(|item| item.kind() != kind) {
                return Err(precondition(Error::DescriptorTypeMismatch {
                    binding,
                    expected: kind,
                    actual: item.kind(),
                }));
            }
            let end = first_element.saturating_add(items.len() as u32);
            if end > size {
                return Err(precondition(Error::ArrayOutOfRange {
                    binding,
                    first: first_element,
                    end,
                    size,
                }));
            }
            if items.is_empty() {
                return Ok(());
            }
            let pool = self.ensure_baked(state)?;
            let set = self.slot_set(&pool, &mut state.slots[index])?;
            self.device.functions().update_descriptor_sets(&[DescriptorWrite {
                set,
                binding,
                first_element,
                kind,
                contents: WriteContents::Items(items),
            }]);
            state.slots[index]
                .record
                .record_items(binding, first_element, kind, items);
            Ok(())
        })
    }

    /// Write raw bytes into an inline uniform block binding.
    /// # Errors
    /// - Fails if `offset` or the size of `data` is not a multiple of 4.
    /// - Fails if the binding is not an inline uniform block, or the data does not fit.
    pub fn set_inline_uniform_block_binding_data(&self, slot: u32, binding: u32, offset: u32, data: &[u8]) -> Result<()> {
        let len = data.len() as u32;
        if offset % 4 != 0 || len % 4 != 0 {
            return Err(precondition(Error::UnalignedInlineUniformBlock {
                offset,
                size: len,
            }));
        }
        self.state.with(|state| -> Result<()> {
            let index = Self::slot_index(state, slot)?;
            let (kind, size) = Self::binding_extent(&state.slots[index], slot, binding)?;
            if kind != DescriptorKind::InlineUniformBlock {
                return Err(precondition(Error::DescriptorTypeMismatch {
                    binding,
                    expected: kind,
                    actual: DescriptorKind::InlineUniformBlock,
                }));
            }
            let end = offset.saturating_add(len);
            if end > size {
                return Err(precondition(Error::ArrayOutOfRange {
                    binding,
                    first: offset,
                    end,
                    size,
                }));
            }
            if data.is_empty() {
                return Ok(());
            }
            let pool = self.ensure_baked(state)?;
            let set = self.slot_set(&pool, &mut state.slots[index])?;
            self.device.functions().update_descriptor_sets(&[DescriptorWrite {
                set,
                binding,
                first_element: offset,
                kind,
                contents: WriteContents::InlineUniformBlock(data),
            }]);
            state.slots[index]
                .record
                .record_inline_uniform_block(binding, offset, data);
            Ok(())
        })
    }

    fn slot_index(state: &GroupState, slot: u32) -> Result<usize> {
        let index = slot as usize;
        if index >= state.slots.len() {
            return Err(precondition(Error::SlotOutOfRange(slot)));
        }
        Ok(index)
    }

    /// Descriptor type and writable size of `binding` in a slot.
    fn binding_extent(entry: &Slot, slot: u32, binding: u32) -> Result<(DescriptorKind, u32)> {
        let layout = entry
            .layout
            .as_ref()
            .ok_or_else(|| precondition(Error::EmptySlot(slot)))?;
        let info = layout
            .info()
            .binding(binding)
            .ok_or_else(|| precondition(Error::NoSuchBinding(binding)))?;
        let size = if info.is_variable_count() {
            entry.variable_count.unwrap_or(info.array_size())
        } else {
            info.array_size()
        };
        Ok((info.kind(), size))
    }

    /// Make sure the pool matches the slots and every slot has a set. Returns the current pool.
    fn ensure_baked(&self, state: &mut GroupState) -> Result<Arc<DescriptorPool>> {
        let current = match state.pool.as_ref() {
            Some(baked) if !state.pool_dirty => baked.pool.clone(),
            _ => self.bake_pool(state)?,
        };
        let GroupState {
            pool,
            slots,
            ..
        } = state;
        if let Some(baked) = pool {
            if !baked.sets_valid.load(Ordering::Acquire) {
                self.bake_sets(baked, slots)?;
            }
        }
        Ok(current)
    }

    fn bake_pool(&self, state: &mut GroupState) -> Result<Arc<DescriptorPool>> {
        let info = census(state.slots.as_slice(), &state.overhead, self.releaseable, self.pool_flags);
        debug!("Creating descriptor pool for {} slots with {}", state.slots.len(), info.sizes);
        let pool = Arc::new(DescriptorPool::new(&self.device, info, self.threading)?);
        let sets_valid = Arc::new(AtomicBool::new(false));
        let flag = sets_valid.clone();
        pool.on_reset(move || flag.store(false, Ordering::Release));
        for slot in &mut state.slots {
            slot.set = None;
        }
        // Replacing the pool destroys the previous one, which implicitly frees its sets.
        state.pool = Some(BakedPool {
            pool: pool.clone(),
            sets_valid,
        });
        state.pool_dirty = false;
        Ok(pool)
    }

    /// Reset the pool, allocate all sets in one call and replay their recorded contents.
    fn bake_sets(&self, baked: &BakedPool, slots: &mut [Slot]) -> Result<()> {
        baked.pool.reset()?;
        for slot in slots.iter_mut() {
            slot.set = None;
        }
        if !slots.is_empty() {
            let dummy = self.device.dummy_set_layout();
            let layouts = slots
                .iter()
                .map(|slot| slot.layout.as_ref().unwrap_or(dummy))
                .collect::<Vec<_>>();
            let counts = slots.iter().map(Slot::allocation_count).collect::<Vec<_>>();
            let sets = baked.pool.allocate(layouts.as_slice(), counts.as_slice())?;
            for (slot, set) in slots.iter_mut().zip(sets) {
                slot.set = Some(set);
            }
            self.replay(slots);
        }
        baked.sets_valid.store(true, Ordering::Release);
        Ok(())
    }

    fn replay(&self, slots: &[Slot]) {
        let writes = slots
            .iter()
            .filter_map(|slot| slot.set.map(|set| slot.record.writes(set)))
            .flatten()
            .collect::<Vec<_>>();
        if !writes.is_empty() {
            self.device.functions().update_descriptor_sets(writes.as_slice());
        }
    }

    /// The set of a slot in a baked group, allocating it again if it was released.
    fn slot_set(&self, pool: &DescriptorPool, slot: &mut Slot) -> Result<vk::DescriptorSet> {
        if let Some(set) = slot.set {
            return Ok(set);
        }
        let layout = slot.layout.as_ref().unwrap_or(self.device.dummy_set_layout());
        let sets = pool.allocate(&[layout], &[slot.allocation_count()])?;
        let set = sets
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::Error::from(Error::VkError(vk::Result::ERROR_OUT_OF_POOL_MEMORY)))?;
        slot.set = Some(set);
        if !slot.record.is_empty() {
            self.device
                .functions()
                .update_descriptor_sets(slot.record.writes(set).as_slice());
        }
        Ok(set)
    }
}
