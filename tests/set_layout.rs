use anyhow::Result;
use ash::vk;

use vkbake::prelude::*;

mod framework;

fn texture_layout() -> Result<DescriptorSetLayoutCreateInfo> {
    DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::VERTEX)?
        .add_binding(1, DescriptorKind::CombinedImageSampler, 4, vk::ShaderStageFlags::FRAGMENT)?
        .build()
}

#[test]
pub fn equal_descriptions_share_layout() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let manager = context.device.set_layouts();
    // The device keeps the dummy layout alive.
    let baseline = context.fns.live_set_layouts();

    let a = manager.get_layout(&texture_layout()?)?;
    let b = manager.get_layout(&texture_layout()?)?;
    assert!(DescriptorSetLayout::ptr_eq(&a, &b), "Equal descriptions should resolve to the same layout.");
    assert_eq!(DescriptorSetLayout::ref_count(&a), 2, "Both handles should be counted.");
    assert_eq!(context.fns.live_set_layouts(), baseline + 1, "Only one layout should be baked.");
    assert_eq!(manager.len(), baseline + 1);

    drop(a);
    assert_eq!(context.fns.live_set_layouts(), baseline + 1, "Layout should survive while a handle is alive.");
    drop(b);
    assert_eq!(context.fns.live_set_layouts(), baseline, "Layout should be destroyed with its last handle.");
    assert_eq!(manager.len(), baseline, "Destroyed layout should leave the cache.");
    Ok(())
}

#[test]
pub fn binding_order_does_not_matter() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let forward = texture_layout()?;
    let backward = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(1, DescriptorKind::CombinedImageSampler, 4, vk::ShaderStageFlags::FRAGMENT)?
        .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::VERTEX)?
        .build()?;
    assert_eq!(forward, backward, "Descriptions should compare by binding contents.");

    let a = context.device.set_layouts().get_layout(&forward)?;
    let b = context.device.set_layouts().get_layout(&backward)?;
    assert!(DescriptorSetLayout::ptr_eq(&a, &b));
    Ok(())
}

#[test]
pub fn different_descriptions_differ() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let a = context.device.set_layouts().get_layout(&texture_layout()?)?;
    let other = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::FRAGMENT)?
        .build()?;
    let b = context.device.set_layouts().get_layout(&other)?;
    assert!(!DescriptorSetLayout::ptr_eq(&a, &b), "Stage flags are part of the layout identity.");
    Ok(())
}

#[test]
pub fn duplicate_binding() -> Result<()> {
    let result = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::UniformBuffer, 1, vk::ShaderStageFlags::VERTEX)?
        .add_binding(0, DescriptorKind::StorageBuffer, 1, vk::ShaderStageFlags::VERTEX);
    assert_eq!(framework::error_of(result), Error::DuplicateBinding(0));
    Ok(())
}

#[test]
pub fn immutable_samplers() -> Result<()> {
    let samplers = vec![vk::Sampler::null(); 2];
    let result = DescriptorSetLayoutCreateInfo::builder().add_binding_with_samplers(
        0,
        DescriptorKind::UniformBuffer,
        2,
        vk::ShaderStageFlags::FRAGMENT,
        samplers.clone(),
    );
    assert_eq!(
        framework::error_of(result),
        Error::ImmutableSamplersNotAllowed(0, DescriptorKind::UniformBuffer)
    );

    let result = DescriptorSetLayoutCreateInfo::builder().add_binding_with_samplers(
        0,
        DescriptorKind::Sampler,
        3,
        vk::ShaderStageFlags::FRAGMENT,
        samplers.clone(),
    );
    assert_eq!(
        framework::error_of(result),
        Error::ImmutableSamplerCount {
            binding: 0,
            expected: 3,
            actual: 2,
        }
    );

    let info = DescriptorSetLayoutCreateInfo::builder()
        .add_binding_with_samplers(0, DescriptorKind::CombinedImageSampler, 2, vk::ShaderStageFlags::FRAGMENT, samplers)?
        .build()?;
    let binding = info.binding(0).expect("Binding 0 should exist.");
    assert_eq!(binding.immutable_samplers().map(<[vk::Sampler]>::len), Some(2));
    Ok(())
}

#[test]
pub fn variable_count_rules() -> Result<()> {
    let variable = vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT;
    let result = DescriptorSetLayoutCreateInfo::builder()
        .add_binding_with_flags(0, DescriptorKind::SampledImage, 64, vk::ShaderStageFlags::FRAGMENT, variable)?
        .add_binding(1, DescriptorKind::Sampler, 1, vk::ShaderStageFlags::FRAGMENT)?
        .build();
    assert_eq!(framework::error_of(result), Error::VariableCountNotLast(0));

    let result = DescriptorSetLayoutCreateInfo::builder()
        .add_binding_with_flags(0, DescriptorKind::SampledImage, 64, vk::ShaderStageFlags::FRAGMENT, variable)?
        .add_binding_with_flags(1, DescriptorKind::StorageImage, 64, vk::ShaderStageFlags::FRAGMENT, variable)?
        .build();
    assert_eq!(framework::error_of(result), Error::MultipleVariableCount);

    let info = DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::Sampler, 1, vk::ShaderStageFlags::FRAGMENT)?
        .add_binding_with_flags(3, DescriptorKind::SampledImage, 64, vk::ShaderStageFlags::FRAGMENT, variable)?
        .build()?;
    let (index, binding) = info
        .variable_count_binding()
        .expect("Layout should have a variable count binding.");
    assert_eq!(index, 3);
    assert_eq!(binding.array_size(), 64, "Array size is the upper bound of a variable count binding.");
    Ok(())
}

#[test]
pub fn failed_bake_inserts_nothing() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let manager = context.device.set_layouts();
    let before = manager.len();

    context
        .fns
        .fail_next(framework::MockCall::CreateSetLayout, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
    let result = manager.get_layout(&texture_layout()?);
    assert_eq!(framework::error_of(result), Error::VkError(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
    assert_eq!(manager.len(), before, "A failed bake should not leave an entry behind.");

    // The next request bakes normally.
    let layout = manager.get_layout(&texture_layout()?)?;
    assert_eq!(layout.info(), &texture_layout()?);
    assert_eq!(manager.len(), before + 1);
    Ok(())
}

#[test]
pub fn dummy_layout() -> Result<()> {
    let context = framework::make_context().expect("Can initialize context.");
    let dummy = context.device.dummy_set_layout();
    let info = dummy.info();
    assert_eq!(info.binding_count(), 1, "Dummy layout should have a single binding.");
    let binding = info.binding(0).expect("Dummy layout should use binding 0.");
    assert_eq!(binding.kind(), DescriptorKind::Sampler);
    assert_eq!(binding.stages(), vk::ShaderStageFlags::empty(), "Dummy binding should not be visible to any stage.");

    let again = context
        .device
        .set_layouts()
        .get_layout(&DescriptorSetLayoutCreateInfo::dummy())?;
    assert!(DescriptorSetLayout::ptr_eq(dummy, &again), "The dummy description should resolve to the device's dummy layout.");
    Ok(())
}
