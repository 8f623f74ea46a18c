//! Wrapper around a `VkPipelineCache`.
//!
//! A pipeline cache can be owned by a single [`PipelineManager`](crate::pipeline::manager::PipelineManager), or
//! shared between several managers and the device. Every bake holds the cache lock, and so does every pipeline
//! destruction, since some drivers read the cache while tearing down pipelines created from it.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::functions::DeviceFunctions;
use crate::util::sync::{ObjectLock, ObjectLockGuard, ThreadingMode};
use crate::{Device, Error};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineCache {
    #[derivative(Debug = "ignore")]
    fns: Arc<dyn DeviceFunctions>,
    handle: vk::PipelineCache,
    lock: ObjectLock,
}

impl PipelineCache {
    /// Create a new pipeline cache, optionally seeded with a blob previously obtained from
    /// [`PipelineCache::get_data()`]. The driver silently ignores incompatible blobs.
    pub fn new(device: &Device, initial_data: &[u8], mode: ThreadingMode) -> Result<Arc<Self>> {
        Self::with_functions(device.functions().clone(), initial_data, mode)
    }

    pub(crate) fn with_functions(fns: Arc<dyn DeviceFunctions>, initial_data: &[u8], mode: ThreadingMode) -> Result<Arc<Self>> {
        let handle = fns.create_pipeline_cache(initial_data).map_err(Error::from)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipelineCache {handle:p}");
        Ok(Arc::new(Self {
            fns,
            handle,
            lock: ObjectLock::new(mode),
        }))
    }

    /// Get unsafe access to the underlying `VkPipelineCache`.
    /// # Safety
    /// The cache must not be used for pipeline creation or destroyed without holding [`PipelineCache::lock()`].
    pub unsafe fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    /// Acquire the cache lock. The lock is re-entrant, so it can be held across calls into managers
    /// that use this cache on the same thread.
    pub fn lock(&self) -> ObjectLockGuard<'_> {
        self.lock.lock()
    }

    /// Export the contents of this cache as an opaque blob.
    pub fn get_data(&self) -> Result<Vec<u8>> {
        let _guard = self.lock();
        Ok(self.fns.get_pipeline_cache_data(self.handle).map_err(Error::from)?)
    }

    /// Merge the contents of other caches into this one.
    pub fn merge(&self, sources: &[&PipelineCache]) -> Result<()> {
        let _guard = self.lock();
        let _source_guards = sources.iter().map(|cache| cache.lock()).collect::<Vec<_>>();
        let handles = sources.iter().map(|cache| cache.handle).collect::<Vec<_>>();
        self.fns
            .merge_pipeline_caches(self.handle, handles.as_slice())
            .map_err(Error::from)?;
        Ok(())
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipelineCache {:p}", self.handle);
        self.fns.destroy_pipeline_cache(self.handle);
    }
}
