//! Framebuffer objects.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use crate::image::ImageView;
use crate::render_pass::RenderPass;
use ash::vk;
use std::sync::Arc;

struct FramebufferResource {
    context: Arc<GpuContext>,
    framebuffer: vk::Framebuffer,
    // The attachments and the pass must outlive the framebuffer.
    _render_pass: RenderPass,
    _attachments: Vec<ImageView>,
}

impl DeviceResource for FramebufferResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .device()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Immutable configuration for framebuffer creation.
pub struct FramebufferInit<'a> {
    pub render_pass: RenderPass,
    pub attachments: Vec<ImageView>,
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub label: &'a str,
}

/// A reference-counted framebuffer. Keeps its render pass and attachment
/// views alive.
#[derive(Clone)]
pub struct Framebuffer {
    shared: Shared<FramebufferResource>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: FramebufferInit<'_>) -> Result<Self> {
        let attachment_views: Vec<vk::ImageView> =
            init.attachments.iter().map(ImageView::raw).collect();

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(init.render_pass.raw())
            .attachments(&attachment_views)
            .width(init.extent.width)
            .height(init.extent.height)
            .layers(init.layers);

        let framebuffer = unsafe {
            context
                .device()
                .create_framebuffer(&create_info, None)
                .map_err(|e| GpuError::native("vkCreateFramebuffer", init.label, e))?
        };

        Ok(Self {
            shared: Shared::new(
                FramebufferResource {
                    context: context.clone(),
                    framebuffer,
                    _render_pass: init.render_pass,
                    _attachments: init.attachments,
                },
                init.label,
            ),
            extent: init.extent,
        })
    }

    /// Get the raw framebuffer handle.
    pub fn raw(&self) -> vk::Framebuffer {
        self.shared.resource().framebuffer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}
