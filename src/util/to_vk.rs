//! Conversions from the typed descriptions of this crate into raw `ash::vk` values.

/// Consume a value and produce the matching Vulkan value.
pub trait IntoVulkanType {
    /// Vulkan type produced by the conversion.
    type Output;

    fn into_vulkan(self) -> Self::Output;
}

/// Produce the matching Vulkan value without consuming the description.
pub trait AsVulkanType {
    /// Vulkan type produced by the conversion.
    type Output;

    fn as_vulkan(&self) -> Self::Output;
}
