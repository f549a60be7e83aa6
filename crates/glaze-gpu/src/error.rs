//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A native Vulkan call failed. Carries the operation name and the
    /// label of the resource involved so the failure is attributable.
    #[error("{op} failed: label = {label}, result = {result:?}")]
    Native {
        op: &'static str,
        label: String,
        result: vk::Result,
    },

    /// Vulkan error without resource context.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No adapter survived suitability filtering.
    #[error("No suitable GPU adapter found")]
    NoSuitableAdapter,

    /// No candidate depth format is usable as a depth-stencil attachment.
    #[error("No supported depth-stencil format found")]
    NoDepthFormat,

    /// Requested validation layer not present.
    #[error("Requested layer not supported: {0}")]
    LayerNotSupported(String),

    /// Requested instance or device extension not present.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File IO failed (shader sources, pipeline cache files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Tag a raw `vk::Result` with the failed operation and resource label.
    pub(crate) fn native(op: &'static str, label: impl Into<String>, result: vk::Result) -> Self {
        Self::Native {
            op,
            label: label.into(),
            result,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
