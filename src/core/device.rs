use std::collections::HashSet;
use std::fmt::Formatter;
use std::sync::Arc;

use anyhow::Result;

use crate::core::ash_functions::AshFunctions;
use crate::core::error::precondition;
use crate::core::functions::DeviceFunctions;
use crate::core::settings::DeviceSettings;
use crate::pipeline::cache::PipelineCache;
use crate::pipeline::pipeline_layout::PipelineLayoutManager;
use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo, DescriptorSetLayoutManager};
use crate::util::sync::ThreadingMode;
use crate::Error;

/// Device extensions that vkbake can use, but might not be enabled.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum ExtensionID {
    /// `VK_EXT_descriptor_indexing`, for update-after-bind and variable descriptor counts.
    DescriptorIndexing,
    /// `VK_EXT_inline_uniform_block`
    InlineUniformBlock,
    /// `VK_AMD_shader_info`
    ShaderInfo,
    /// `VK_EXT_debug_utils`
    DebugUtils,
    /// `VK_AMD_rasterization_order`
    RasterizationOrder,
}

impl std::fmt::Display for ExtensionID {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    extensions: HashSet<ExtensionID>,
    threading: ThreadingMode,
    pipeline_layouts: PipelineLayoutManager,
    set_layouts: DescriptorSetLayoutManager,
    dummy_set_layout: DescriptorSetLayout,
    pipeline_cache: Option<Arc<PipelineCache>>,
}

/// Wrapper around a `VkDevice` and the layout managers that belong to it. Internal state is wrapped in an
/// `Arc<DeviceInner>`, so this is safe to clone
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Create a new device on top of a set of device functions.
    /// # Errors
    /// - Fails if the dummy descriptor set layout cannot be created.
    /// - Fails if the device pipeline cache cannot be created.
    pub fn new(fns: Arc<dyn DeviceFunctions>, settings: &DeviceSettings) -> Result<Self> {
        let set_layouts = DescriptorSetLayoutManager::new(fns.clone(), settings.threading);
        let pipeline_layouts = PipelineLayoutManager::new(fns.clone(), set_layouts.clone(), settings.threading);
        let dummy_set_layout = set_layouts.get_layout(&DescriptorSetLayoutCreateInfo::dummy())?;
        let pipeline_cache = if settings.pipeline_cache {
            Some(PipelineCache::with_functions(
                fns.clone(),
                settings.pipeline_cache_data.as_slice(),
                settings.threading,
            )?)
        } else {
            None
        };

        info!("Enabled vkbake extensions:");
        for ext in &settings.extensions {
            info!("{ext}");
        }

        Ok(Device {
            inner: Arc::new(DeviceInner {
                fns,
                extensions: settings.extensions.clone(),
                threading: settings.threading,
                pipeline_layouts,
                set_layouts,
                dummy_set_layout,
                pipeline_cache,
            }),
        })
    }

    /// Create a new device from an already initialized `ash::Device`. Extension function tables are loaded for
    /// every enabled extension that has one.
    pub fn from_ash(instance: &ash::Instance, device: ash::Device, settings: &DeviceSettings) -> Result<Self> {
        let fns = AshFunctions::new(instance, device, &settings.extensions);
        Self::new(Arc::new(fns), settings)
    }

    /// Access to the device functions.
    pub fn functions(&self) -> &Arc<dyn DeviceFunctions> {
        &self.inner.fns
    }

    /// The descriptor set layout manager of this device.
    pub fn set_layouts(&self) -> &DescriptorSetLayoutManager {
        &self.inner.set_layouts
    }

    /// The pipeline layout manager of this device.
    pub fn pipeline_layouts(&self) -> &PipelineLayoutManager {
        &self.inner.pipeline_layouts
    }

    /// A layout with a single sampler binding, used in place of empty descriptor set slots.
    pub fn dummy_set_layout(&self) -> &DescriptorSetLayout {
        &self.inner.dummy_set_layout
    }

    /// The device-wide pipeline cache, if it was enabled.
    pub fn pipeline_cache(&self) -> Option<&Arc<PipelineCache>> {
        self.inner.pipeline_cache.as_ref()
    }

    pub fn threading(&self) -> ThreadingMode {
        self.inner.threading
    }

    /// Check if an extension is enabled.
    pub fn is_extension_enabled(&self, ext: ExtensionID) -> bool {
        self.inner.extensions.contains(&ext)
    }

    /// Fails with [`Error::ExtensionNotSupported`] if the extension is not enabled.
    pub fn require_extension(&self, ext: ExtensionID) -> Result<()> {
        if self.is_extension_enabled(ext) {
            Ok(())
        } else {
            Err(precondition(Error::ExtensionNotSupported(ext)))
        }
    }
}
