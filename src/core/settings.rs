//! Exposes all structs needed to store device initialization parameters.

use std::collections::HashSet;

use crate::core::device::ExtensionID;
use crate::util::sync::ThreadingMode;

/// Settings used to initialize a [`Device`](crate::Device).
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Threading mode of the device owned layout managers and pipeline cache.
    pub threading: ThreadingMode,
    /// Extensions that are enabled on the underlying `VkDevice`. Features that need an extension outside of
    /// this set fail with [`Error::ExtensionNotSupported`](crate::Error::ExtensionNotSupported).
    pub extensions: HashSet<ExtensionID>,
    /// Whether to create a device-wide pipeline cache that pipeline managers can share.
    pub pipeline_cache: bool,
    /// Initial contents of the device pipeline cache, as previously exported with
    /// [`PipelineCache::get_data()`](crate::pipeline::cache::PipelineCache::get_data).
    pub pipeline_cache_data: Vec<u8>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettingsBuilder::new().build()
    }
}

/// The device settings builder is a convenience struct to easily create [`DeviceSettings`].
///
/// For information about each of the fields, see [`DeviceSettings`]
/// # Example
/// ```ignore
/// # use vkbake::prelude::*;
/// let settings = DeviceSettingsBuilder::new()
///     .threading(ThreadingMode::MultiThreaded)
///     .extension(ExtensionID::DescriptorIndexing)
///     .pipeline_cache(true)
///     .build();
/// ```
#[derive(Debug)]
pub struct DeviceSettingsBuilder {
    inner: DeviceSettings,
}

impl DeviceSettingsBuilder {
    /// Create a new settings builder with default settings.
    pub fn new() -> Self {
        DeviceSettingsBuilder {
            inner: DeviceSettings {
                threading: ThreadingMode::SingleThreaded,
                extensions: HashSet::new(),
                pipeline_cache: true,
                pipeline_cache_data: Vec::new(),
            },
        }
    }

    /// Sets the threading mode.
    pub fn threading(mut self, mode: ThreadingMode) -> Self {
        self.inner.threading = mode;
        self
    }

    /// Mark an extension as enabled.
    pub fn extension(mut self, ext: ExtensionID) -> Self {
        self.inner.extensions.insert(ext);
        self
    }

    pub fn extensions(mut self, exts: impl IntoIterator<Item = ExtensionID>) -> Self {
        self.inner.extensions.extend(exts);
        self
    }

    /// Enable or disable the device pipeline cache.
    pub fn pipeline_cache(mut self, enabled: bool) -> Self {
        self.inner.pipeline_cache = enabled;
        self
    }

    /// Seed the device pipeline cache with an exported blob.
    pub fn pipeline_cache_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.inner.pipeline_cache_data = data.into();
        self
    }

    /// Build the resulting device settings.
    pub fn build(self) -> DeviceSettings {
        self.inner
    }
}

impl Default for DeviceSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
