use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use vkbake::prelude::*;

/// GPU calls that can be told to fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateSetLayout,
    CreatePipelineLayout,
    CreatePool,
    ResetPool,
    AllocateSets,
    FreeSets,
    CreatePipelineCache,
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub pool: vk::DescriptorPool,
    pub layouts: Vec<vk::DescriptorSetLayout>,
    pub variable_counts: Option<Vec<u32>>,
    pub sets: Vec<vk::DescriptorSet>,
}

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub first_element: u32,
    pub kind: DescriptorKind,
    pub items: Vec<DescriptorItem>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BakedPipeline {
    pub handle: vk::Pipeline,
    pub flags: vk::PipelineCreateFlags,
    pub base: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub stages: Vec<ShaderStage>,
    pub specialization_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BakeCall {
    pub compute: bool,
    pub cache: vk::PipelineCache,
    pub pipelines: Vec<BakedPipeline>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub set_layouts: HashMap<vk::DescriptorSetLayout, DescriptorSetLayoutCreateInfo>,
    pub set_layouts_created: usize,
    pub pipeline_layouts: HashMap<vk::PipelineLayout, Vec<vk::DescriptorSetLayout>>,
    pub pipeline_layouts_created: usize,
    pub pools: HashMap<vk::DescriptorPool, DescriptorPoolCreateInfo>,
    pub pool_infos: Vec<DescriptorPoolCreateInfo>,
    pub pool_resets: usize,
    pub allocations: Vec<Allocation>,
    pub freed: Vec<vk::DescriptorSet>,
    pub writes: Vec<WriteRecord>,
    pub shader_modules: HashSet<vk::ShaderModule>,
    pub pipeline_caches: HashSet<vk::PipelineCache>,
    pub bakes: Vec<BakeCall>,
    pub pipelines: HashSet<vk::Pipeline>,
    pub names: Vec<(u64, String)>,
    pub fail_next: Option<(MockCall, vk::Result)>,
    /// Fail creating the pipeline at this index of the next pipeline batch.
    pub fail_pipeline: Option<(usize, vk::Result)>,
    pub shader_info: bool,
}

/// Device functions that fabricate handles and record every call.
#[derive(Debug, Default)]
pub struct MockFunctions {
    next_handle: AtomicU64,
    pub state: Mutex<MockState>,
}

impl MockFunctions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(1),
            state: Mutex::new(MockState::default()),
        })
    }

    fn handle<T: Handle>(&self) -> T {
        T::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn check(state: &mut MockState, call: MockCall) -> VkResult<()> {
        match state.fail_next {
            Some((failing, result)) if failing == call => {
                state.fail_next = None;
                Err(result)
            }
            _ => Ok(()),
        }
    }

    /// Make the next call of this kind fail with `result`.
    pub fn fail_next(&self, call: MockCall, result: vk::Result) {
        self.state.lock().fail_next = Some((call, result));
    }

    /// Make the pipeline at `index` of the next batch fail with `result`.
    pub fn fail_pipeline(&self, index: usize, result: vk::Result) {
        self.state.lock().fail_pipeline = Some((index, result));
    }

    pub fn enable_shader_info(&self) {
        self.state.lock().shader_info = true;
    }

    pub fn live_set_layouts(&self) -> usize {
        self.state.lock().set_layouts.len()
    }

    pub fn live_pipeline_layouts(&self) -> usize {
        self.state.lock().pipeline_layouts.len()
    }

    pub fn live_pools(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn last_pool_info(&self) -> Option<DescriptorPoolCreateInfo> {
        self.state.lock().pool_infos.last().cloned()
    }

    pub fn last_allocation(&self) -> Option<Allocation> {
        self.state.lock().allocations.last().cloned()
    }

    pub fn bakes(&self) -> Vec<BakeCall> {
        self.state.lock().bakes.clone()
    }

    /// All writes that targeted `set`, in call order.
    pub fn writes_to(&self, set: vk::DescriptorSet) -> Vec<WriteRecord> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|write| write.set == set)
            .cloned()
            .collect()
    }

    fn create_pipelines(&self, compute: bool, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult {
        let mut state = self.state.lock();
        let failure = state.fail_pipeline.take();
        let mut error = None;
        let mut handles = Vec::with_capacity(infos.len());
        let mut pipelines = Vec::with_capacity(infos.len());
        for (index, info) in infos.iter().enumerate() {
            let handle = match failure {
                Some((failing, result)) if failing == index => {
                    error = Some(result);
                    vk::Pipeline::null()
                }
                _ => {
                    let handle = self.handle::<vk::Pipeline>();
                    state.pipelines.insert(handle);
                    handle
                }
            };
            handles.push(handle);
            pipelines.push(BakedPipeline {
                handle,
                flags: info.flags,
                base: info.base_pipeline,
                layout: info.layout,
                stages: info.stages.iter().map(|stage| stage.stage()).collect(),
                specialization_data: info.specialization.data().to_vec(),
            });
        }
        state.bakes.push(BakeCall {
            compute,
            cache,
            pipelines,
        });
        match error {
            None => Ok(handles),
            Some(result) => Err((handles, result)),
        }
    }
}

impl DeviceFunctions for MockFunctions {
    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::CreateSetLayout)?;
        let handle = self.handle();
        state.set_layouts.insert(handle, info.clone());
        state.set_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let removed = self.state.lock().set_layouts.remove(&layout);
        assert!(removed.is_some(), "Descriptor set layout {layout:?} destroyed twice.");
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        _push_constants: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::CreatePipelineLayout)?;
        for layout in set_layouts {
            assert!(state.set_layouts.contains_key(layout), "Pipeline layout uses dead set layout {layout:?}.");
        }
        let handle = self.handle();
        state.pipeline_layouts.insert(handle, set_layouts.to_vec());
        state.pipeline_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let removed = self.state.lock().pipeline_layouts.remove(&layout);
        assert!(removed.is_some(), "Pipeline layout {layout:?} destroyed twice.");
    }

    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::CreatePool)?;
        let handle = self.handle();
        state.pools.insert(handle, info.clone());
        state.pool_infos.push(info.clone());
        Ok(handle)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::ResetPool)?;
        assert!(state.pools.contains_key(&pool), "Reset of dead pool {pool:?}.");
        state.pool_resets += 1;
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let removed = self.state.lock().pools.remove(&pool);
        assert!(removed.is_some(), "Descriptor pool {pool:?} destroyed twice.");
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
        variable_counts: Option<&[u32]>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::AllocateSets)?;
        assert!(state.pools.contains_key(&pool), "Allocation from dead pool {pool:?}.");
        if let Some(counts) = variable_counts {
            assert_eq!(counts.len(), layouts.len(), "One variable count per layout.");
        }
        let sets = layouts.iter().map(|_| self.handle()).collect::<Vec<_>>();
        state.allocations.push(Allocation {
            pool,
            layouts: layouts.to_vec(),
            variable_counts: variable_counts.map(<[u32]>::to_vec),
            sets: sets.clone(),
        });
        Ok(sets)
    }

    fn free_descriptor_sets(&self, _pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::FreeSets)?;
        state.freed.extend_from_slice(sets);
        Ok(())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]) {
        let mut state = self.state.lock();
        for write in writes {
            let (items, data) = match write.contents {
                WriteContents::Items(items) => (items.to_vec(), Vec::new()),
                WriteContents::InlineUniformBlock(data) => (Vec::new(), data.to_vec()),
            };
            state.writes.push(WriteRecord {
                set: write.set,
                binding: write.binding,
                first_element: write.first_element,
                kind: write.kind,
                items,
                data,
            });
        }
    }

    fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        let handle = self.handle();
        self.state.lock().shader_modules.insert(handle);
        Ok(handle)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().shader_modules.remove(&module);
    }

    fn create_pipeline_cache(&self, _initial_data: &[u8]) -> VkResult<vk::PipelineCache> {
        let mut state = self.state.lock();
        Self::check(&mut state, MockCall::CreatePipelineCache)?;
        let handle = self.handle();
        state.pipeline_caches.insert(handle);
        Ok(handle)
    }

    fn get_pipeline_cache_data(&self, cache: vk::PipelineCache) -> VkResult<Vec<u8>> {
        Ok(cache.as_raw().to_le_bytes().to_vec())
    }

    fn merge_pipeline_caches(&self, _dst: vk::PipelineCache, _src: &[vk::PipelineCache]) -> VkResult<()> {
        Ok(())
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.state.lock().pipeline_caches.remove(&cache);
    }

    fn create_compute_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult {
        assert!(infos.iter().all(|info| info.graphics.is_none()), "Compute batch with graphics state.");
        self.create_pipelines(true, cache, infos)
    }

    fn create_graphics_pipelines(&self, cache: vk::PipelineCache, infos: &[PipelineBakeInfo<'_>]) -> PipelineBatchResult {
        assert!(infos.iter().all(|info| info.graphics.is_some()), "Graphics batch without graphics state.");
        self.create_pipelines(false, cache, infos)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let removed = self.state.lock().pipelines.remove(&pipeline);
        assert!(removed, "Pipeline {pipeline:?} destroyed twice.");
    }

    fn get_shader_info(
        &self,
        _pipeline: vk::Pipeline,
        _stage: ShaderStage,
        _info_type: vk::ShaderInfoTypeAMD,
    ) -> Option<VkResult<Vec<u8>>> {
        self.state
            .lock()
            .shader_info
            .then(|| Ok(b"disassembly".to_vec()))
    }

    fn get_shader_statistics(&self, _pipeline: vk::Pipeline, _stage: ShaderStage) -> Option<VkResult<vk::ShaderStatisticsInfoAMD>> {
        self.state.lock().shader_info.then(|| {
            Ok(vk::ShaderStatisticsInfoAMD {
                num_physical_vgprs: 256,
                num_available_vgprs: 128,
                ..Default::default()
            })
        })
    }

    fn set_object_name(&self, _object_type: vk::ObjectType, handle: u64, name: &str) -> VkResult<()> {
        self.state.lock().names.push((handle, name.to_owned()));
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Context {
    pub fns: Arc<MockFunctions>,
    pub device: Device,
}

/// Creates a device on top of recording device functions, with every extension enabled.
pub fn make_context() -> Result<Context> {
    make_context_with_settings(|builder| {
        builder.extensions([
            ExtensionID::DescriptorIndexing,
            ExtensionID::InlineUniformBlock,
            ExtensionID::ShaderInfo,
            ExtensionID::DebugUtils,
            ExtensionID::RasterizationOrder,
        ])
    })
}

pub fn make_context_with_settings<F: FnOnce(DeviceSettingsBuilder) -> DeviceSettingsBuilder>(callback: F) -> Result<Context> {
    let _ = pretty_env_logger::try_init();
    let settings = callback(DeviceSettingsBuilder::new()).build();
    let fns = MockFunctions::new();
    let device = Device::new(fns.clone(), &settings)?;
    Ok(Context {
        fns,
        device,
    })
}

/// Shader stage backed by a fake SPIR-V module.
pub fn shader(context: &Context, stage: ShaderStage) -> Result<ShaderStageInfo> {
    let module = ShaderModule::from_spirv(&context.device, &[0x0723_0203, 0x0001_0000])?;
    Ok(ShaderStageInfo::new(stage, module))
}

/// Layout with a single uniform buffer at binding 0.
pub fn uniform_buffer_layout(stages: vk::ShaderStageFlags) -> Result<DescriptorSetLayoutCreateInfo> {
    DescriptorSetLayoutCreateInfo::builder()
        .add_binding(0, DescriptorKind::UniformBuffer, 1, stages)?
        .build()
}

/// Extract the vkbake error from a failed result.
pub fn error_of<T: std::fmt::Debug>(result: Result<T>) -> Error {
    let err = result.expect_err("Operation should fail.");
    err.downcast_ref::<Error>()
        .cloned()
        .unwrap_or_else(|| panic!("Not a vkbake error: {err}"))
}

/// A fake buffer handle, unique per value.
pub fn buffer(raw: u64) -> vk::Buffer {
    vk::Buffer::from_raw(0xb000 + raw)
}
