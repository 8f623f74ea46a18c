//! Shader modules, shader stages and specialization constants used to build pipelines.
//!
//! A [`ShaderModule`] owns a `VkShaderModule` created from SPIR-V, and is shared between stages with an `Arc`.

use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::functions::DeviceFunctions;
use crate::util::to_vk::IntoVulkanType;
use crate::{Device, Error};

/// Programmable stage of a compute or graphics pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Stages a graphics pipeline may have.
    pub const GRAPHICS: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];
}

impl IntoVulkanType for ShaderStage {
    type Output = vk::ShaderStageFlags;

    fn into_vulkan(self) -> Self::Output {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// Shader module object. Destroyed once the last pipeline create info that references it goes away.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ShaderModule {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    handle: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from a SPIR-V binary.
    pub fn from_spirv(device: &Device, code: &[u32]) -> Result<Arc<Self>> {
        let fns = device.functions().clone();
        let handle = fns.create_shader_module(code).map_err(Error::from)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkShaderModule {handle:p}");
        Ok(Arc::new(Self {
            fns,
            handle,
        }))
    }

    /// Get unsafe access to the underlying `VkShaderModule` object.
    /// # Safety
    /// Any vulkan calls that mutate the shader module may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkShaderModule {:p}", self.handle);
        self.fns.destroy_shader_module(self.handle);
    }
}

/// A shader module bound to a pipeline stage, together with its entry point.
#[derive(Debug, Clone)]
pub struct ShaderStageInfo {
    stage: ShaderStage,
    module: Arc<ShaderModule>,
    entry_point: CString,
}

impl ShaderStageInfo {
    /// Use `module` for `stage`, with the entry point `main`.
    pub fn new(stage: ShaderStage, module: Arc<ShaderModule>) -> Self {
        Self {
            stage,
            module,
            entry_point: CString::from(c"main"),
        }
    }

    /// Use a different entry point.
    /// # Errors
    /// Fails if the name contains a nul byte.
    pub fn with_entry_point(mut self, name: impl Into<Vec<u8>>) -> Result<Self> {
        self.entry_point = CString::new(name)?;
        Ok(self)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> &Arc<ShaderModule> {
        &self.module
    }

    pub fn entry_point(&self) -> &CStr {
        self.entry_point.as_c_str()
    }
}

/// One specialization constant, pointing into the shared data buffer of [`SpecializationConstants`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SpecializationEntry {
    pub constant_id: u32,
    pub offset: u32,
    pub size: u32,
}

/// Specialization constants of every stage of a pipeline. All values live in a single byte buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecializationConstants {
    entries: BTreeMap<ShaderStage, Vec<SpecializationEntry>>,
    data: Vec<u8>,
}

impl SpecializationConstants {
    /// Append a constant for `stage`. The bytes are copied into the shared buffer.
    pub fn add(&mut self, stage: ShaderStage, constant_id: u32, value: &[u8]) {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value);
        self.entries.entry(stage).or_default().push(SpecializationEntry {
            constant_id,
            offset,
            size: value.len() as u32,
        });
    }

    /// Constants declared for `stage`.
    pub fn entries(&self, stage: ShaderStage) -> &[SpecializationEntry] {
        self.entries.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    /// The shared data buffer.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Statistics reported by `VK_AMD_shader_info` for one stage of a baked pipeline.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ShaderStatistics {
    pub used_vgprs: u32,
    pub used_sgprs: u32,
    pub lds_size_per_local_work_group: u32,
    pub lds_usage_bytes: usize,
    pub scratch_memory_usage_bytes: usize,
    pub physical_vgprs: u32,
    pub physical_sgprs: u32,
    pub available_vgprs: u32,
    pub available_sgprs: u32,
    pub compute_work_group_size: [u32; 3],
}

impl From<vk::ShaderStatisticsInfoAMD> for ShaderStatistics {
    fn from(value: vk::ShaderStatisticsInfoAMD) -> Self {
        Self {
            used_vgprs: value.resource_usage.num_used_vgprs,
            used_sgprs: value.resource_usage.num_used_sgprs,
            lds_size_per_local_work_group: value.resource_usage.lds_size_per_local_work_group,
            lds_usage_bytes: value.resource_usage.lds_usage_size_in_bytes,
            scratch_memory_usage_bytes: value.resource_usage.scratch_mem_usage_in_bytes,
            physical_vgprs: value.num_physical_vgprs,
            physical_sgprs: value.num_physical_sgprs,
            available_vgprs: value.num_available_vgprs,
            available_sgprs: value.num_available_sgprs,
            compute_work_group_size: value.compute_work_group_size,
        }
    }
}
