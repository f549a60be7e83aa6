//! Vulkan presentation and resource layer for Glaze.
//!
//! This crate provides:
//! - Instance, adapter selection, and device management
//! - Reference-counted resource handles with destroy-on-last-release
//! - Swapchain negotiation and rebuild
//! - Per-frame synchronization slots
//! - Fluent command recording and submission
//! - Memory allocation via gpu-allocator

pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod framebuffer;
mod handle;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod pipeline_cache;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::{Buffer, BufferInit};
pub use capabilities::{AdapterInfo, GpuVendor};
pub use command::{CommandRecorder, SubmitSync, VertexBufferBindings};
pub use context::{GpuContext, GpuContextBuilder, QueueRole};
pub use descriptors::{
    write_storage_buffer, write_storage_image, write_uniform_buffer, DescriptorPool,
    DescriptorPoolInit, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutInit, LayoutBinding,
};
pub use error::{GpuError, Result};
pub use framebuffer::{Framebuffer, FramebufferInit};
pub use image::{Image, ImageInit, ImageView, ImageViewInit};
pub use memory::MemoryLocation;
pub use pipeline::{
    BlendInfo, ComputePipelineConfig, DepthStencilInfo, GraphicsPipelineConfig, Pipeline,
    RasterizationInfo, VertexAttribute, VertexBinding,
};
pub use pipeline_cache::PipelineCache;
pub use render_pass::{RenderPass, RenderPassConfig, SubpassConfig};
pub use shader::{ShaderModule, ShaderModuleInit, ShaderSource};
pub use surface::SurfaceSupport;
pub use swapchain::{
    find_depth_format, select_surface_format, Acquire, PresentOutcome, Swapchain,
};
pub use sync::{Fence, FrameSync, FrameSyncManager, Semaphore, MAX_FRAMES_IN_FLIGHT};
pub use texture::TextureInit;
