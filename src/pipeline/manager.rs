//! The pipeline manager stages pipeline create infos and bakes them into Vulkan pipelines in batches.
//!
//! Every registered pipeline is either a *proxy*, which never gets a handle and is only used as the base
//! of derivatives, or goes through `outstanding -> baked -> deleted`. Querying any handle bakes every
//! outstanding pipeline first, issuing one creation call per pipeline kind. Derivatives are baked in a
//! later wave than their base, so the base handle is always known when the derivative is created.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use crate::core::device::ExtensionID;
use crate::core::error::precondition;
use crate::core::functions::{DeviceFunctions, PipelineBakeInfo};
use crate::pipeline::cache::PipelineCache;
use crate::pipeline::create_info::PipelineCreateInfo;
use crate::pipeline::pipeline_layout::PipelineLayout;
use crate::pipeline::shader::{ShaderStage, ShaderStatistics};
use crate::pipeline::PipelineId;
use crate::util::sync::{Guarded, ObjectLock, ThreadingMode};
use crate::{Device, Error};

/// Selects which `VkPipelineCache` a [`PipelineManager`] bakes with.
#[derive(Debug, Clone, Default)]
pub enum PipelineCacheUsage {
    /// Bake without a pipeline cache.
    Disabled,
    /// The manager creates and owns a cache of its own.
    #[default]
    Private,
    /// Use the device-wide cache.
    Device,
    /// Share an existing cache with other managers.
    Shared(Arc<PipelineCache>),
}

type CreatedCallback = Arc<dyn Fn(PipelineId) + Send + Sync>;

#[derive(Derivative)]
#[derivative(Debug)]
struct PipelineRecord {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    info: PipelineCreateInfo,
    handle: vk::Pipeline,
    layout: Option<PipelineLayout>,
    cache: Option<Arc<PipelineCache>>,
    lock: ObjectLock,
}

impl PipelineRecord {
    fn has_handle(&self) -> bool {
        self.handle != vk::Pipeline::null()
    }
}

impl Drop for PipelineRecord {
    fn drop(&mut self) {
        if !self.has_handle() {
            return;
        }
        // Cache lock first, then the record lock.
        let _cache_guard = self.cache.as_ref().map(|cache| cache.lock());
        let _guard = self.lock.lock();
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipeline {:p}", self.handle);
        self.fns.destroy_pipeline(self.handle);
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    next_id: u32,
    outstanding: BTreeMap<PipelineId, PipelineRecord>,
    baked: BTreeMap<PipelineId, PipelineRecord>,
}

impl ManagerState {
    fn record(&self, id: PipelineId) -> Option<&PipelineRecord> {
        self.baked.get(&id).or_else(|| self.outstanding.get(&id))
    }

    fn record_mut(&mut self, id: PipelineId) -> Option<&mut PipelineRecord> {
        match self.baked.get_mut(&id) {
            Some(record) => Some(record),
            None => self.outstanding.get_mut(&id),
        }
    }

    /// Handle to pass as the base of `info`. Null if there is no base, or the base is a proxy or gone.
    fn base_handle(&self, info: &PipelineCreateInfo) -> vk::Pipeline {
        info.base_pipeline()
            .and_then(|base| self.baked.get(&base))
            .filter(|base| !base.info.is_proxy())
            .map(|base| base.handle)
            .unwrap_or_else(vk::Pipeline::null)
    }
}

/// Owns a set of pipelines, identified by [`PipelineId`].
/// # Example
/// ```ignore
/// use vkbake::prelude::*;
///
/// let manager = PipelineManager::new(&device, PipelineCacheUsage::Private, ThreadingMode::MultiThreaded)?;
/// let id = manager.add_pipeline(info)?;
/// // Baked on first use.
/// let pipeline = manager.get_pipeline(id)?;
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineManager {
    device: Device,
    cache: Option<Arc<PipelineCache>>,
    threading: ThreadingMode,
    state: Guarded<ManagerState>,
    #[derivative(Debug = "ignore")]
    subscribers: Guarded<Vec<CreatedCallback>>,
    /// Serializes add, delete and bake, and keeps lookups from observing a half finished bake.
    lock: ObjectLock,
}

impl PipelineManager {
    /// Create a new pipeline manager.
    /// # Errors
    /// - Fails with [`Error::NoPipelineCache`] if [`PipelineCacheUsage::Device`] is requested but the
    ///   device was created without a pipeline cache.
    /// - Fails if a private pipeline cache could not be created.
    pub fn new(device: &Device, cache: PipelineCacheUsage, mode: ThreadingMode) -> Result<Self> {
        let cache = match cache {
            PipelineCacheUsage::Disabled => None,
            PipelineCacheUsage::Private => Some(PipelineCache::with_functions(device.functions().clone(), &[], mode)?),
            PipelineCacheUsage::Device => Some(
                device
                    .pipeline_cache()
                    .cloned()
                    .ok_or_else(|| precondition(Error::NoPipelineCache))?,
            ),
            PipelineCacheUsage::Shared(cache) => Some(cache),
        };
        Ok(Self {
            device: device.clone(),
            cache,
            threading: mode,
            state: Guarded::new(mode, ManagerState::default()),
            subscribers: Guarded::new(mode, Vec::new()),
            lock: ObjectLock::new(mode),
        })
    }

    /// Register a new pipeline. The pipeline is baked on the next call to [`PipelineManager::bake()`], or the next
    /// handle query. Proxy pipelines are never baked.
    ///
    /// Subscribers registered through [`PipelineManager::on_pipeline_created()`] are notified before this returns.
    /// # Errors
    /// - Fails with [`Error::InvalidBasePipeline`] if the base pipeline does not exist, or is of a different kind.
    ///   A compute pipeline can only derive from a compute pipeline, a graphics pipeline only from a graphics pipeline.
    /// - Fails with [`Error::BaseNotDerivable`] if the base pipeline does not allow derivatives.
    /// - Fails with [`Error::ExtensionNotSupported`] if the pipeline requests a rasterization order without
    ///   [`ExtensionID::RasterizationOrder`].
    /// - Fails with [`Error::PipelineIdsExhausted`] if no more ids can be handed out.
    pub fn add_pipeline(&self, info: PipelineCreateInfo) -> Result<PipelineId> {
        if info
            .graphics()
            .is_some_and(|state| state.rasterization.rasterization_order.is_some())
        {
            self.device.require_extension(ExtensionID::RasterizationOrder)?;
        }

        let _guard = self.lock.lock();
        let id = self.state.with(|state| -> Result<PipelineId> {
            if let Some(base) = info.base_pipeline() {
                let Some(base_record) = state.record(base) else {
                    return Err(precondition(Error::InvalidBasePipeline(base)));
                };
                if base_record.info.is_compute() != info.is_compute() {
                    return Err(precondition(Error::InvalidBasePipeline(base)));
                }
                if !base_record.info.allows_derivatives() {
                    return Err(precondition(Error::BaseNotDerivable(base)));
                }
            }
            if state.next_id == u32::MAX {
                return Err(precondition(Error::PipelineIdsExhausted));
            }
            let id = PipelineId(state.next_id);
            state.next_id += 1;

            let proxy = info.is_proxy();
            let record = PipelineRecord {
                fns: self.device.functions().clone(),
                info,
                handle: vk::Pipeline::null(),
                layout: None,
                cache: self.cache.clone(),
                lock: ObjectLock::new(self.threading),
            };
            if proxy {
                state.baked.insert(id, record);
            } else {
                state.outstanding.insert(id, record);
            }
            Ok(id)
        })?;

        let subscribers = self.subscribers.with(|subscribers| subscribers.clone());
        for notify in subscribers {
            notify(id);
        }
        Ok(id)
    }

    /// Delete a pipeline, destroying its handle if it was baked. Returns `false` if the id does not exist.
    /// Derivatives of this pipeline that are not baked yet are baked without a base.
    pub fn delete_pipeline(&self, id: PipelineId) -> bool {
        let _guard = self.lock.lock();
        let record = self
            .state
            .with(|state| state.outstanding.remove(&id).or_else(|| state.baked.remove(&id)));
        // The record is dropped here, outside of the state.
        record.is_some()
    }

    /// Get the handle of a pipeline, baking all outstanding pipelines first.
    /// # Errors
    /// - Fails with [`Error::ProxyPipelineQuery`] if this is a proxy pipeline.
    /// - Fails with [`Error::PipelineNotFound`] if the id does not exist.
    /// - Fails with the driver error if this pipeline could not be baked.
    pub fn get_pipeline(&self, id: PipelineId) -> Result<vk::Pipeline> {
        let _guard = self.lock.lock();
        let bake_result = self.bake();
        let lookup = self.state.with(|state| -> Result<Option<vk::Pipeline>> {
            if let Some(record) = state.baked.get(&id) {
                if record.info.is_proxy() {
                    return Err(precondition(Error::ProxyPipelineQuery(id)));
                }
                return Ok(Some(record.handle));
            }
            if state.outstanding.contains_key(&id) {
                return Ok(None);
            }
            Err(precondition(Error::PipelineNotFound(id)))
        })?;
        match lookup {
            Some(handle) => {
                if let Err(err) = bake_result {
                    warn!("Pipeline {id} is baked, but baking other pipelines failed: {err}");
                }
                Ok(handle)
            }
            None => {
                bake_result?;
                Err(precondition(Error::PipelineNotFound(id)))
            }
        }
    }

    /// Get a copy of the create info a pipeline was registered with.
    pub fn get_pipeline_create_info(&self, id: PipelineId) -> Result<PipelineCreateInfo> {
        self.state.with(|state| {
            state
                .record(id)
                .map(|record| record.info.clone())
                .ok_or_else(|| precondition(Error::PipelineNotFound(id)))
        })
    }

    /// Get the pipeline layout of a pipeline. The layout is resolved through the device's pipeline layout
    /// manager on first use, and kept alive by the pipeline afterwards.
    /// # Errors
    /// - Fails with [`Error::ProxyPipelineQuery`] if this is a proxy pipeline.
    /// - Fails with [`Error::PipelineNotFound`] if the id does not exist.
    pub fn get_pipeline_layout(&self, id: PipelineId) -> Result<PipelineLayout> {
        let _guard = self.lock.lock();
        self.state.with(|state| -> Result<PipelineLayout> {
            let Some(record) = state.record_mut(id) else {
                return Err(precondition(Error::PipelineNotFound(id)));
            };
            if record.info.is_proxy() {
                return Err(precondition(Error::ProxyPipelineQuery(id)));
            }
            self.resolve_layout(record)
        })
    }

    /// Query `vkGetShaderInfoAMD` for one stage of a pipeline, baking it first if needed.
    /// # Errors
    /// - Fails with [`Error::ExtensionNotSupported`] if [`ExtensionID::ShaderInfo`] is not enabled.
    /// - Fails with [`Error::InvalidShaderStage`] if the pipeline has no shader for `stage`.
    pub fn get_shader_info(&self, id: PipelineId, stage: ShaderStage, info_type: vk::ShaderInfoTypeAMD) -> Result<Vec<u8>> {
        let pipeline = self.shader_info_pipeline(id, stage)?;
        match self.device.functions().get_shader_info(pipeline, stage, info_type) {
            Some(result) => Ok(result.map_err(Error::from)?),
            None => Err(precondition(Error::ExtensionNotSupported(ExtensionID::ShaderInfo))),
        }
    }

    /// Query shader resource usage statistics for one stage of a pipeline, baking it first if needed.
    /// # Errors
    /// See [`PipelineManager::get_shader_info()`].
    pub fn get_shader_statistics(&self, id: PipelineId, stage: ShaderStage) -> Result<ShaderStatistics> {
        let pipeline = self.shader_info_pipeline(id, stage)?;
        match self.device.functions().get_shader_statistics(pipeline, stage) {
            Some(result) => Ok(ShaderStatistics::from(result.map_err(Error::from)?)),
            None => Err(precondition(Error::ExtensionNotSupported(ExtensionID::ShaderInfo))),
        }
    }

    fn shader_info_pipeline(&self, id: PipelineId, stage: ShaderStage) -> Result<vk::Pipeline> {
        if !self.device.is_extension_enabled(ExtensionID::ShaderInfo) {
            warn!("Shader info requested for pipeline {id}, but {} is not enabled.", ExtensionID::ShaderInfo);
            return Err(anyhow::Error::from(Error::ExtensionNotSupported(ExtensionID::ShaderInfo)));
        }
        let has_stage = self.state.with(|state| {
            state
                .record(id)
                .map(|record| record.info.stage(stage).is_some())
        });
        if has_stage == Some(false) {
            return Err(precondition(Error::InvalidShaderStage(stage)));
        }
        self.get_pipeline(id)
    }

    /// Bake all outstanding pipelines.
    /// # Errors
    /// Fails with the first driver error if any pipeline could not be created. Pipelines that were created
    /// anyway are baked, the others stay outstanding. A failure in one batch does not stop the other pipeline
    /// kind, or derivatives of bases that did bake.
    pub fn bake(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let _cache_guard = self.cache.as_ref().map(|cache| cache.lock());
        self.state.with(|state| self.bake_outstanding(state))
    }

    fn bake_outstanding(&self, state: &mut ManagerState) -> Result<()> {
        let mut failed = HashSet::new();
        let mut first_error = None;
        loop {
            // A wave holds every pipeline whose base is not outstanding anymore.
            let wave = state
                .outstanding
                .iter()
                .filter(|(id, record)| {
                    !failed.contains(*id)
                        && record
                            .info
                            .base_pipeline()
                            .map_or(true, |base| !state.outstanding.contains_key(&base))
                })
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();
            if wave.is_empty() {
                break;
            }
            let mut ready = Vec::with_capacity(wave.len());
            for id in wave {
                let Some(record) = state.outstanding.get_mut(&id) else {
                    continue;
                };
                match self.resolve_layout(record) {
                    Ok(_) => ready.push(id),
                    Err(err) => {
                        failed.insert(id);
                        first_error.get_or_insert(err);
                    }
                }
            }
            let (compute, graphics): (Vec<PipelineId>, Vec<PipelineId>) = ready
                .into_iter()
                .partition(|id| state.outstanding.get(id).is_some_and(|record| record.info.is_compute()));
            // Both kinds are issued every wave, a failing batch does not hold back the other one.
            for (ids, compute) in [(compute, true), (graphics, false)] {
                if let Err(err) = self.bake_batch(state, ids.as_slice(), compute) {
                    first_error.get_or_insert(err);
                }
                failed.extend(ids.into_iter().filter(|id| state.outstanding.contains_key(id)));
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    fn bake_batch(&self, state: &mut ManagerState, ids: &[PipelineId], compute: bool) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!("Baking {} {} pipelines", ids.len(), if compute { "compute" } else { "graphics" });

        let fns = self.device.functions();
        let cache = self
            .cache
            .as_ref()
            // SAFETY: The cache lock is held by bake().
            .map(|cache| unsafe { cache.handle() })
            .unwrap_or_else(vk::PipelineCache::null);
        let result = {
            let infos = ids
                .iter()
                .filter_map(|id| state.outstanding.get(id))
                .map(|record| {
                    let base_pipeline = state.base_handle(&record.info);
                    let mut flags = record.info.flags();
                    if base_pipeline == vk::Pipeline::null() {
                        flags &= !vk::PipelineCreateFlags::DERIVATIVE;
                    }
                    PipelineBakeInfo {
                        flags,
                        stages: record.info.stages(),
                        specialization: record.info.specialization(),
                        // SAFETY: The layout is kept alive by the record.
                        layout: record
                            .layout
                            .as_ref()
                            .map(|layout| unsafe { layout.handle() })
                            .unwrap_or_else(vk::PipelineLayout::null),
                        base_pipeline,
                        graphics: record.info.graphics(),
                    }
                })
                .collect::<Vec<_>>();
            if compute {
                fns.create_compute_pipelines(cache, infos.as_slice())
            } else {
                fns.create_graphics_pipelines(cache, infos.as_slice())
            }
        };

        let (handles, error) = match result {
            Ok(handles) => (handles, None),
            Err((handles, err)) => (handles, Some(err)),
        };
        for (id, handle) in ids.iter().zip(handles) {
            if handle == vk::Pipeline::null() {
                continue;
            }
            let Some(mut record) = state.outstanding.remove(id) else {
                continue;
            };
            #[cfg(feature = "log-objects")]
            trace!("Created new VkPipeline {handle:p}");
            record.handle = handle;
            if let Some(name) = record.info.name() {
                if let Err(err) = fns.set_object_name(vk::ObjectType::PIPELINE, handle.as_raw(), name) {
                    warn!("Could not name pipeline {id}: {err}");
                }
            }
            state.baked.insert(*id, record);
        }
        match error {
            None => Ok(()),
            Some(err) => {
                error!("Pipeline bake failed: {err}");
                Err(anyhow::Error::from(Error::VkError(err)))
            }
        }
    }

    fn resolve_layout(&self, record: &mut PipelineRecord) -> Result<PipelineLayout> {
        if let Some(layout) = &record.layout {
            return Ok(layout.clone());
        }
        let layout = self
            .device
            .pipeline_layouts()
            .get_layout_for(record.info.layout())?;
        record.layout = Some(layout.clone());
        Ok(layout)
    }

    /// Register a callback invoked with the id of every pipeline added from now on.
    pub fn on_pipeline_created(&self, callback: impl Fn(PipelineId) + Send + Sync + 'static) {
        self.subscribers
            .with(|subscribers| subscribers.push(Arc::new(callback)));
    }

    /// Whether this pipeline currently has a handle. Always `false` for proxies.
    pub fn is_baked(&self, id: PipelineId) -> bool {
        self.state
            .with(|state| state.baked.get(&id).is_some_and(PipelineRecord::has_handle))
    }

    /// Amount of pipelines waiting to be baked.
    pub fn outstanding_count(&self) -> usize {
        self.state.with(|state| state.outstanding.len())
    }

    /// Amount of pipelines with a handle.
    pub fn baked_count(&self) -> usize {
        self.state
            .with(|state| state.baked.values().filter(|record| record.has_handle()).count())
    }

    /// The pipeline cache used for baking, if any.
    pub fn pipeline_cache(&self) -> Option<&Arc<PipelineCache>> {
        self.cache.as_ref()
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        let live = self.baked_count();
        if live > 0 {
            warn!("Pipeline manager dropped with {live} live pipelines, destroying them.");
        }
    }
}
