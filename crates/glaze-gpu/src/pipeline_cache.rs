//! Pipeline cache persistence.
//!
//! The cache's on-disk contents are whatever opaque blob the driver
//! produced; this layer only moves the bytes.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

struct PipelineCacheResource {
    context: Arc<GpuContext>,
    cache: vk::PipelineCache,
}

impl DeviceResource for PipelineCacheResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_pipeline_cache(self.cache, None);
        }
    }
}

/// A reference-counted pipeline cache.
#[derive(Clone)]
pub struct PipelineCache {
    shared: Shared<PipelineCacheResource>,
}

impl PipelineCache {
    fn create(
        context: &Arc<GpuContext>,
        initial_data: &[u8],
        label: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);

        let cache = unsafe {
            context
                .device()
                .create_pipeline_cache(&create_info, None)
                .map_err(|e| GpuError::native("vkCreatePipelineCache", &label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                PipelineCacheResource {
                    context: context.clone(),
                    cache,
                },
                label,
            ),
        })
    }

    /// Create an empty pipeline cache.
    pub fn empty(context: &Arc<GpuContext>, label: impl Into<String>) -> Result<Self> {
        Self::create(context, &[], label)
    }

    /// Load a pipeline cache from disk. A missing or unreadable file
    /// yields a valid empty cache rather than an error.
    pub fn load(context: &Arc<GpuContext>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();
        match read_cache_file(path) {
            Some(data) => Self::create(context, &data, label),
            None => Self::create(context, &[], label),
        }
    }

    /// Get the raw pipeline cache handle.
    pub fn raw(&self) -> vk::PipelineCache {
        self.shared.resource().cache
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Copy the cache's current contents out of the driver.
    pub fn data(&self) -> Result<Vec<u8>> {
        let resource = self.shared.resource();
        unsafe {
            resource
                .context
                .device()
                .get_pipeline_cache_data(resource.cache)
                .map_err(|e| GpuError::native("vkGetPipelineCacheData", self.shared.label(), e))
        }
    }

    /// Write the cache's current contents to disk.
    pub fn serialize(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.data()?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// Read a previously serialized cache blob; `None` when the file is
/// missing or unreadable.
pub(crate) fn read_cache_file(path: &Path) -> Option<Vec<u8>> {
    std::fs::read(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.cache");

        let blob: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        std::fs::write(&path, &blob).unwrap();

        let read_back = read_cache_file(&path).expect("cache file exists");
        assert_eq!(read_back.len(), blob.len());
        assert_eq!(read_back, blob);
    }

    #[test]
    fn missing_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.cache");
        assert!(read_cache_file(&path).is_none());
    }
}
