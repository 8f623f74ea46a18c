use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use vkbake::prelude::*;

mod framework;

fn storage_layout(size: u32) -> Result<DescriptorSetLayoutCreateInfo> {
    DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::StorageBuffer, size, vk::ShaderStageFlags::COMPUTE)?
        .build()
}

fn variable_layout() -> Result<DescriptorSetLayoutCreateInfo> {
    DescriptorSetLayoutCreateInfo::builder()
        .add_binding_with_flags(
            0,
            DescriptorKind::StorageBuffer,
            1024,
            vk::ShaderStageFlags::COMPUTE,
            vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        )?
        .build()
}

fn make_group(context: &framework::Context, layouts: Vec<Option<DescriptorSetLayoutCreateInfo>>) -> Result<DescriptorSetGroup> {
    DescriptorSetGroup::new(
        &context.device,
        DescriptorSetGroupCreateInfo {
            layouts,
            ..Default::default()
        },
    )
}

fn storage_item(raw: u64) -> DescriptorItem {
    DescriptorItem::StorageBuffer(BufferRange::whole(framework::buffer(raw)))
}

#[test]
pub fn null_slot_uses_dummy_layout() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let uniform = framework::uniform_buffer_layout(vk::ShaderStageFlags::VERTEX)?;
    let group = make_group(&context, vec![Some(uniform.clone()), None, Some(storage_layout(2)?)])?;
    assert_eq!(context.fns.live_pools(), 0, "The pool should only be created once a set is needed.");

    let first = group.descriptor_set(0)?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.max_sets, 3, "Every slot should get a set.");
    assert_eq!(info.sizes.get(DescriptorKind::UniformBuffer), 1);
    assert_eq!(info.sizes.get(DescriptorKind::StorageBuffer), 2);
    assert_eq!(info.sizes.get(DescriptorKind::Sampler), 0, "The empty slot should not be counted.");

    let allocation = context.fns.last_allocation().expect("Sets should be allocated.");
    assert_eq!(allocation.layouts.len(), 3, "All sets should be allocated in one call.");
    let dummy = unsafe { context.device.dummy_set_layout().handle() };
    assert_eq!(allocation.layouts[1], dummy, "The empty slot should be allocated with the dummy layout.");
    let uniform = context.device.set_layouts().get_layout(&uniform)?;
    assert_eq!(allocation.layouts[0], unsafe { uniform.handle() });

    let middle = group.descriptor_set(1)?;
    assert_eq!(first, allocation.sets[0]);
    assert_eq!(middle, allocation.sets[1], "The empty slot should still have a set.");
    assert_ne!(group.descriptor_set(2)?.as_raw(), 0);
    assert!(group.layout(1)?.is_none());
    Ok(())
}

#[test]
pub fn variable_descriptor_count_override() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(variable_layout()?)])?;
    assert_eq!(group.variable_descriptor_count(0)?, Some(1024), "Without an override the upper bound is used.");

    group.set_variable_descriptor_count(0, 8)?;
    assert_eq!(group.variable_descriptor_count(0)?, Some(8));
    group.descriptor_set(0)?;

    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.sizes.get(DescriptorKind::StorageBuffer), 8, "The pool should be sized for the override.");
    let allocation = context.fns.last_allocation().expect("Sets should be allocated.");
    assert_eq!(allocation.variable_counts, Some(vec![8]), "The override should be passed to the allocation.");

    let result = group.set_binding_array_items(0, 0, 6, &[storage_item(1), storage_item(2), storage_item(3)]);
    assert_eq!(
        framework::error_of(result),
        Error::ArrayOutOfRange {
            binding: 0,
            first: 6,
            end: 9,
            size: 8,
        }
    );
    Ok(())
}

#[test]
pub fn variable_descriptor_count_errors() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(variable_layout()?), Some(storage_layout(1)?)])?;
    assert_eq!(
        framework::error_of(group.set_variable_descriptor_count(1, 4)),
        Error::NoVariableCountBinding(1)
    );
    assert_eq!(
        framework::error_of(group.set_variable_descriptor_count(0, 2000)),
        Error::ArrayOutOfRange {
            binding: 0,
            first: 0,
            end: 2000,
            size: 1024,
        }
    );
    assert_eq!(group.variable_descriptor_count(1)?, None);
    Ok(())
}

#[test]
pub fn shrinking_variable_count_truncates_record() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(variable_layout()?)])?;
    group.set_variable_descriptor_count(0, 16)?;
    let items = (0..4).map(storage_item).collect::<Vec<_>>();
    group.set_binding_array_items(0, 0, 4, items.as_slice())?;

    group.set_variable_descriptor_count(0, 6)?;
    let set = group.descriptor_set(0)?;
    let writes = context.fns.writes_to(set);
    assert_eq!(writes.len(), 1, "The recorded write should be replayed into the new set.");
    assert_eq!(writes[0].first_element, 4);
    assert_eq!(writes[0].items, items[..2].to_vec(), "Elements past the new count should be dropped.");
    Ok(())
}

#[test]
pub fn writes_are_replayed_after_rebake() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(4)?)])?;
    group.set_binding_item(0, 0, 1, storage_item(7))?;
    let old = group.descriptor_set(0)?;
    assert_eq!(context.fns.writes_to(old).len(), 1, "The write should reach the current set.");

    group.adjust_overhead(DescriptorKind::Sampler, 4);
    let new = group.descriptor_set(0)?;
    assert_ne!(old, new, "Changing the overhead should reallocate the sets.");
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.sizes.get(DescriptorKind::Sampler), 4, "The overhead should be reserved in the pool.");
    assert_eq!(info.sizes.get(DescriptorKind::StorageBuffer), 4);
    assert_eq!(context.fns.live_pools(), 1, "The old pool should be destroyed.");

    let writes = context.fns.writes_to(new);
    assert_eq!(writes.len(), 1, "Recorded writes should be replayed into the new set.");
    assert_eq!(writes[0].first_element, 1);
    assert_eq!(writes[0].items, vec![storage_item(7)]);

    // Setting the same overhead again is not a change.
    group.adjust_overhead(DescriptorKind::Sampler, 4);
    assert_eq!(group.descriptor_set(0)?, new);
    Ok(())
}

#[test]
pub fn overwritten_writes_are_not_replayed() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(4)?)])?;
    group.set_binding_item(0, 0, 0, storage_item(1))?;
    group.set_binding_array_items(0, 0, 0, &[storage_item(2), storage_item(3)])?;

    group.reset_pool()?;
    let set = group.descriptor_set(0)?;
    let writes = context.fns.writes_to(set);
    assert_eq!(writes.len(), 1, "Only the write that is still visible should be replayed.");
    assert_eq!(writes[0].items, vec![storage_item(2), storage_item(3)]);
    Ok(())
}

#[test]
pub fn reset_pool_reallocates_sets() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(1)?), Some(storage_layout(1)?)])?;
    group.set_binding_item(1, 0, 0, storage_item(3))?;
    let before = [group.descriptor_set(0)?, group.descriptor_set(1)?];

    group.reset_pool()?;
    assert_eq!(context.fns.live_pools(), 1, "Resetting should keep the pool.");
    let after = [group.descriptor_set(0)?, group.descriptor_set(1)?];
    assert_ne!(before, after, "Sets should be reallocated after a reset.");
    assert_eq!(context.fns.writes_to(after[1]).len(), 1, "Contents should survive the reset.");
    assert!(context.fns.writes_to(after[0]).is_empty());
    Ok(())
}

#[test]
pub fn external_pool_reset_invalidates_sets() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(1)?)])?;
    group.set_binding_item(0, 0, 0, storage_item(5))?;
    let before = group.descriptor_set(0)?;

    group.descriptor_pool()?.reset()?;
    let after = group.descriptor_set(0)?;
    assert_ne!(before, after, "A reset through the pool should invalidate the group's sets.");
    assert_eq!(context.fns.writes_to(after).len(), 1, "Contents should be replayed after the reset.");
    Ok(())
}

#[test]
pub fn set_layout_forgets_contents() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(1)?)])?;
    group.set_binding_item(0, 0, 0, storage_item(5))?;
    group.descriptor_set(0)?;

    group.set_layout(0, Some(storage_layout(2)?))?;
    let set = group.descriptor_set(0)?;
    assert!(context.fns.writes_to(set).is_empty(), "Contents of the old layout should not be replayed.");
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.sizes.get(DescriptorKind::StorageBuffer), 2, "The pool should be sized for the new layout.");

    group.set_layout(0, None)?;
    assert_eq!(framework::error_of(group.set_binding_item(0, 0, 0, storage_item(5))), Error::EmptySlot(0));
    Ok(())
}

#[test]
pub fn release_set_reallocates_on_demand() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = DescriptorSetGroup::new(
        &context.device,
        DescriptorSetGroupCreateInfo {
            layouts: vec![Some(storage_layout(1)?), Some(storage_layout(1)?)],
            releaseable_sets: true,
            ..Default::default()
        },
    )?;
    group.set_binding_item(0, 0, 0, storage_item(9))?;
    let old = group.descriptor_set(0)?;
    let other = group.descriptor_set(1)?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert!(info.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));

    group.release_set(0)?;
    assert!(context.fns.state.lock().freed.contains(&old), "The set should be returned to the pool.");
    let new = group.descriptor_set(0)?;
    assert_ne!(old, new);
    assert_eq!(group.descriptor_set(1)?, other, "Other slots should keep their set.");
    assert_eq!(context.fns.writes_to(new).len(), 1, "Contents should be written to the new set.");

    let plain = make_group(&context, vec![Some(storage_layout(1)?)])?;
    assert_eq!(framework::error_of(plain.release_set(0)), Error::SetsNotReleaseable);
    Ok(())
}

#[test]
pub fn write_validation() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(2)?), None])?;

    let uniform = DescriptorItem::UniformBuffer(BufferRange::whole(framework::buffer(1)));
    assert_eq!(
        framework::error_of(group.set_binding_item(0, 0, 0, uniform)),
        Error::DescriptorTypeMismatch {
            binding: 0,
            expected: DescriptorKind::StorageBuffer,
            actual: DescriptorKind::UniformBuffer,
        }
    );
    assert_eq!(
        framework::error_of(group.set_binding_array_items(0, 0, 1, &[storage_item(1), storage_item(2)])),
        Error::ArrayOutOfRange {
            binding: 0,
            first: 1,
            end: 3,
            size: 2,
        }
    );
    assert_eq!(framework::error_of(group.set_binding_item(0, 3, 0, storage_item(1))), Error::NoSuchBinding(3));
    assert_eq!(framework::error_of(group.set_binding_item(1, 0, 0, storage_item(1))), Error::EmptySlot(1));
    assert_eq!(framework::error_of(group.set_binding_item(2, 0, 0, storage_item(1))), Error::SlotOutOfRange(2));
    assert_eq!(framework::error_of(group.descriptor_set(2)), Error::SlotOutOfRange(2));
    assert!(context.fns.state.lock().writes.is_empty(), "Rejected writes should not reach the driver.");
    Ok(())
}

#[test]
pub fn inline_uniform_blocks() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let layout = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::InlineUniformBlock, 64, vk::ShaderStageFlags::FRAGMENT)?
        .add_binding(1, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::FRAGMENT)?
        .build()?;
    let group = make_group(&context, vec![Some(layout)])?;

    assert_eq!(
        framework::error_of(group.set_inline_uniform_block_binding_data(0, 0, 2, &[0; 8])),
        Error::UnalignedInlineUniformBlock {
            offset: 2,
            size: 8,
        }
    );
    assert_eq!(
        framework::error_of(group.set_inline_uniform_block_binding_data(0, 0, 60, &[0; 8])),
        Error::ArrayOutOfRange {
            binding: 0,
            first: 60,
            end: 68,
            size: 64,
        }
    );
    assert_eq!(
        framework::error_of(group.set_inline_uniform_block_binding_data(0, 1, 0, &[0; 4])),
        Error::DescriptorTypeMismatch {
            binding: 1,
            expected: DescriptorKind::UniformBuffer,
            actual: DescriptorKind::InlineUniformBlock,
        }
    );

    group.set_inline_uniform_block_binding_data(0, 0, 16, &[1, 2, 3, 4])?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.sizes.get(DescriptorKind::InlineUniformBlock), 64, "Inline uniform blocks are sized in bytes.");
    assert_eq!(info.inline_uniform_block_bindings, 1);

    let set = group.descriptor_set(0)?;
    let writes = context.fns.writes_to(set);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].first_element, 16, "The byte offset should be passed as the first element.");
    assert_eq!(writes[0].data, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
pub fn inline_uniform_blocks_need_extension() -> Result<()> {
    let context = framework::make_context_with_settings(|builder| builder).expect("Can initialize context.");
    let layout = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::InlineUniformBlock, 16, vk::ShaderStageFlags::FRAGMENT)?
        .build()?;
    let group = make_group(&context, vec![Some(layout)])?;
    assert_eq!(
        framework::error_of(group.descriptor_set(0)),
        Error::ExtensionNotSupported(ExtensionID::InlineUniformBlock)
    );
    Ok(())
}

#[test]
pub fn update_after_bind_marks_pool() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let layout = DescriptorSetLayoutCreateInfo::builder()
        .add_binding_with_flags(
            0,
            DescriptorKind::SampledImage,
            16,
            vk::ShaderStageFlags::FRAGMENT,
            vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
        )?
        .build()?;
    let group = make_group(&context, vec![Some(layout), Some(storage_layout(1)?)])?;
    group.descriptor_set(1)?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert!(
        info.flags.contains(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND),
        "A single update-after-bind binding should mark the whole pool."
    );
    assert_eq!(context.fns.live_pools(), 1, "All slots should share one pool.");
    Ok(())
}

#[test]
pub fn derived_group_shares_layouts() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let parent = make_group(&context, vec![Some(variable_layout()?), None])?;
    parent.set_variable_descriptor_count(0, 32)?;
    let child = DescriptorSetGroup::with_parent(&parent, DescriptorSetGroupCreateInfo::default())?;
    assert!(child.is_derived());
    assert_eq!(child.slot_count(), 2);

    let parent_layout = parent.layout(0)?.expect("Parent slot 0 should have a layout.");
    let child_layout = child.layout(0)?.expect("Child slot 0 should have a layout.");
    assert!(DescriptorSetLayout::ptr_eq(&parent_layout, &child_layout), "Layouts should be shared with the parent.");
    assert!(child.layout(1)?.is_none());
    assert_eq!(child.variable_descriptor_count(0)?, Some(32), "Variable counts should be inherited.");

    assert_ne!(parent.descriptor_set(0)?, child.descriptor_set(0)?, "Each group should own its sets.");
    assert_eq!(context.fns.live_pools(), 2, "Each group should own its pool.");

    assert_eq!(framework::error_of(child.set_layout(0, None)), Error::DerivedGroupLayoutChange);
    assert_eq!(
        framework::error_of(DescriptorSetGroup::with_parent(&child, DescriptorSetGroupCreateInfo::default())),
        Error::NestedParentGroup
    );
    assert_eq!(
        framework::error_of(DescriptorSetGroup::with_parent(
            &parent,
            DescriptorSetGroupCreateInfo {
                layouts: vec![None],
                ..Default::default()
            }
        )),
        Error::DerivedGroupLayoutChange
    );
    assert_eq!(
        framework::error_of(DescriptorSetGroup::with_parent(
            &parent,
            DescriptorSetGroupCreateInfo {
                releaseable_sets: true,
                ..Default::default()
            }
        )),
        Error::ReleaseableMismatch
    );
    Ok(())
}

#[test]
pub fn empty_group_gets_minimal_pool() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![None])?;
    group.descriptor_set(0)?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(info.max_sets, 1);
    assert!(!info.sizes.is_empty(), "A pool must never be created without room for descriptors.");
    Ok(())
}

#[test]
pub fn pool_errors_pass_through() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let group = make_group(&context, vec![Some(storage_layout(1)?)])?;
    context
        .fns
        .fail_next(framework::MockCall::AllocateSets, vk::Result::ERROR_FRAGMENTED_POOL);
    assert_eq!(
        framework::error_of(group.descriptor_set(0)),
        Error::VkError(vk::Result::ERROR_FRAGMENTED_POOL)
    );
    // Nothing was handed out, so the next request tries again.
    assert_ne!(group.descriptor_set(0)?.as_raw(), 0);
    Ok(())
}

#[test]
pub fn pool_size_saturates() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let layout = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::StorageBuffer, u32::MAX, vk::ShaderStageFlags::COMPUTE)?
        .add_binding(1, DescriptorKind::StorageBuffer, 1, vk::ShaderStageFlags::COMPUTE)?
        .build()?;
    let group = make_group(&context, vec![Some(layout)])?;
    group.adjust_overhead(DescriptorKind::StorageBuffer, 16);

    group.descriptor_set(0)?;
    let info = context.fns.last_pool_info().expect("Pool should be created.");
    assert_eq!(
        info.sizes.get(DescriptorKind::StorageBuffer),
        u32::MAX,
        "Descriptor counts should saturate instead of overflowing."
    );
    Ok(())
}
