//! Shader modules.
//!
//! Shaders are consumed as pre-compiled SPIR-V blobs; no compilation,
//! validation, or reflection happens here.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use ash::vk;
use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct ShaderModuleResource {
    context: Arc<GpuContext>,
    module: vk::ShaderModule,
    entry: CString,
}

impl DeviceResource for ShaderModuleResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_shader_module(self.module, None);
        }
    }
}

/// Where the SPIR-V comes from.
pub enum ShaderSource {
    /// Raw SPIR-V bytes already in memory.
    Bytes(Vec<u8>),
    /// A file read whole at creation time.
    File(PathBuf),
}

/// Immutable configuration for shader module creation.
pub struct ShaderModuleInit<'a> {
    pub source: ShaderSource,
    pub stage: vk::ShaderStageFlags,
    pub entry: &'a str,
    pub label: &'a str,
}

impl<'a> ShaderModuleInit<'a> {
    /// Configuration for a shader loaded from a SPIR-V file.
    pub fn from_file(path: impl AsRef<Path>, stage: vk::ShaderStageFlags, label: &'a str) -> Self {
        Self {
            source: ShaderSource::File(path.as_ref().to_path_buf()),
            stage,
            entry: "main",
            label,
        }
    }

    /// Configuration for a shader already in memory.
    pub fn from_bytes(bytes: Vec<u8>, stage: vk::ShaderStageFlags, label: &'a str) -> Self {
        Self {
            source: ShaderSource::Bytes(bytes),
            stage,
            entry: "main",
            label,
        }
    }
}

/// A reference-counted shader module.
#[derive(Clone)]
pub struct ShaderModule {
    shared: Shared<ShaderModuleResource>,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create a shader module from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: ShaderModuleInit<'_>) -> Result<Self> {
        let bytes = match init.source {
            ShaderSource::Bytes(bytes) => bytes,
            ShaderSource::File(path) => std::fs::read(&path)?,
        };

        let code = ash::util::read_spv(&mut Cursor::new(&bytes))
            .map_err(|e| GpuError::Other(format!("Invalid SPIR-V for {}: {e}", init.label)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe {
            context
                .device()
                .create_shader_module(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateShaderModule", init.label, e))?
        };

        let entry = CString::new(init.entry)
            .map_err(|_| GpuError::Other(format!("entry point for {} contains NUL", init.label)))?;

        Ok(Self {
            shared: Shared::new(
                ShaderModuleResource {
                    context: context.clone(),
                    module,
                    entry,
                },
                init.label,
            ),
            stage: init.stage,
        })
    }

    /// Get the raw shader module handle.
    pub fn raw(&self) -> vk::ShaderModule {
        self.shared.resource().module
    }

    /// The pipeline stage this module is written for.
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    /// The entry point name, for pipeline stage assembly.
    pub fn entry(&self) -> &CStr {
        &self.shared.resource().entry
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}
