//! Images and image views.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::{DeviceResource, Shared};
use crate::memory::MemoryLocation;
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

struct ImageResource {
    context: Arc<GpuContext>,
    image: vk::Image,
    allocation: Option<Allocation>,
}

impl DeviceResource for ImageResource {
    fn destroy(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.context
                .allocator()
                .lock()
                .destroy_image(self.image, allocation);
        }
    }
}

/// Immutable configuration for image creation.
pub struct ImageInit<'a> {
    pub image_type: vk::ImageType,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub initial_layout: vk::ImageLayout,
    pub location: MemoryLocation,
    pub label: &'a str,
}

impl Default for ImageInit<'_> {
    fn default() -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            extent: vk::Extent3D {
                width: 0,
                height: 0,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_SRGB,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::SAMPLED,
            samples: vk::SampleCountFlags::TYPE_1,
            initial_layout: vk::ImageLayout::UNDEFINED,
            location: MemoryLocation::GpuOnly,
            label: "unnamed image",
        }
    }
}

/// A reference-counted image with allocator-backed memory.
#[derive(Clone)]
pub struct Image {
    shared: Shared<ImageResource>,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    layer_count: u32,
}

impl Image {
    /// Create an image from the given configuration.
    pub fn new(context: &Arc<GpuContext>, init: ImageInit<'_>) -> Result<Self> {
        if init.extent.width == 0 || init.extent.height == 0 {
            return Err(GpuError::InvalidState(format!(
                "image {} created with zero extent",
                init.label
            )));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(init.image_type)
            .extent(init.extent)
            .mip_levels(init.mip_levels)
            .array_layers(init.array_layers)
            .format(init.format)
            .tiling(init.tiling)
            .usage(init.usage)
            .samples(init.samples)
            .initial_layout(init.initial_layout)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let (image, allocation) =
            context
                .allocator()
                .lock()
                .create_image(&create_info, init.location, init.label)?;

        Ok(Self {
            shared: Shared::new(
                ImageResource {
                    context: context.clone(),
                    image,
                    allocation: Some(allocation),
                },
                init.label,
            ),
            format: init.format,
            extent: init.extent,
            mip_levels: init.mip_levels,
            layer_count: init.array_layers,
        })
    }

    /// Get the raw image handle.
    pub fn raw(&self) -> vk::Image {
        self.shared.resource().image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

struct ImageViewResource {
    context: Arc<GpuContext>,
    view: vk::ImageView,
    // Keeps the viewed image alive for swapchain-independent images.
    _image: Option<Image>,
}

impl DeviceResource for ImageViewResource {
    fn destroy(&mut self) {
        unsafe {
            self.context.device().destroy_image_view(self.view, None);
        }
    }
}

/// Immutable configuration for image-view creation.
pub struct ImageViewInit<'a> {
    pub image: Image,
    pub view_type: vk::ImageViewType,
    pub aspect_mask: vk::ImageAspectFlags,
    pub label: &'a str,
}

/// A reference-counted image view. Holds the underlying image alive.
#[derive(Clone)]
pub struct ImageView {
    shared: Shared<ImageViewResource>,
}

impl ImageView {
    /// Create a view over an allocator-backed image.
    pub fn new(context: &Arc<GpuContext>, init: ImageViewInit<'_>) -> Result<Self> {
        let view = unsafe {
            create_view_raw(
                context,
                init.image.raw(),
                init.view_type,
                init.image.format(),
                init.aspect_mask,
                init.image.mip_levels(),
                init.image.layer_count(),
                init.label,
            )?
        };

        Ok(Self {
            shared: Shared::new(
                ImageViewResource {
                    context: context.clone(),
                    view,
                    _image: Some(init.image),
                },
                init.label,
            ),
        })
    }

    /// Create a view over an image the swapchain owns. The swapchain keeps
    /// the image alive; the view must not outlive it.
    pub(crate) fn for_swapchain_image(
        context: &Arc<GpuContext>,
        image: vk::Image,
        format: vk::Format,
        label: &str,
    ) -> Result<Self> {
        let view = unsafe {
            create_view_raw(
                context,
                image,
                vk::ImageViewType::TYPE_2D,
                format,
                vk::ImageAspectFlags::COLOR,
                1,
                1,
                label,
            )?
        };

        Ok(Self {
            shared: Shared::new(
                ImageViewResource {
                    context: context.clone(),
                    view,
                    _image: None,
                },
                label,
            ),
        })
    }

    /// Get the raw image view handle.
    pub fn raw(&self) -> vk::ImageView {
        self.shared.resource().view
    }

    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn create_view_raw(
    context: &Arc<GpuContext>,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    level_count: u32,
    layer_count: u32,
    label: &str,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(level_count)
                .base_array_layer(0)
                .layer_count(layer_count),
        );

    unsafe {
        context
            .device()
            .create_image_view(&view_info, None)
            .map_err(|e| GpuError::native("vkCreateImageView", label, e))
    }
}
