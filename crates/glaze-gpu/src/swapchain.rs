//! Swapchain management.
//!
//! Keeps a chain of presentable images, one depth buffer and one
//! framebuffer per image, in sync with the window's drawable size. The
//! chain is rebuilt whenever the surface goes stale (resize, failed
//! acquire or present); the previous chain is destroyed only after the
//! replacement is fully built.

use crate::context::{GpuContext, QueueRole};
use crate::error::{GpuError, Result};
use crate::framebuffer::{Framebuffer, FramebufferInit};
use crate::handle::{DeviceResource, Shared};
use crate::image::{Image, ImageInit, ImageView, ImageViewInit};
use crate::memory::MemoryLocation;
use crate::render_pass::RenderPass;
use crate::sync::Semaphore;
use ash::vk;
use std::sync::Arc;

/// Depth formats probed in preference order.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Outcome of acquiring the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// An image was acquired; render this tick. A suboptimal surface is
    /// still rendered to; only presentation treats it as stale.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface is out of date; skip this tick and rebuild.
    OutOfDate,
}

/// Outcome of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The surface is suboptimal or out of date; rebuild before the next
    /// frame.
    Stale,
}

struct SwapchainResource {
    context: Arc<GpuContext>,
    swapchain: vk::SwapchainKHR,
}

impl DeviceResource for SwapchainResource {
    fn destroy(&mut self) {
        unsafe {
            self.context
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

/// The presentable image chain and its per-image resources.
pub struct Swapchain {
    // Declaration order is drop order: views and framebuffers must go
    // before the native swapchain that owns the images they reference.
    framebuffers: Vec<Framebuffer>,
    depth_views: Vec<ImageView>,
    depth_images: Vec<Image>,
    image_views: Vec<ImageView>,
    images: Vec<vk::Image>,
    handle: Shared<SwapchainResource>,

    format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    min_image_count: u32,
    context: Arc<GpuContext>,
}

impl Swapchain {
    /// Build a swapchain for the context's surface.
    ///
    /// Surface capabilities, formats and present modes are queried fresh;
    /// they can change after a resize. `format` pins a previously chosen
    /// surface format (`None` selects one); `old` passes the previous
    /// chain's native handle as a reuse hint and must stay alive until
    /// this call returns.
    pub fn new(
        context: &Arc<GpuContext>,
        drawable_extent: vk::Extent2D,
        render_pass: &RenderPass,
        depth_format: vk::Format,
        format: Option<vk::SurfaceFormatKHR>,
        old: Option<&Self>,
    ) -> Result<Self> {
        let support = context.surface_support()?;

        let format = format.unwrap_or_else(|| select_surface_format(&support.formats));
        let present_mode = select_present_mode(&support.present_modes);
        let extent = select_extent(&support.capabilities, drawable_extent);
        let image_count = select_image_count(&support.capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(
                old.map_or_else(vk::SwapchainKHR::null, |chain| chain.handle.resource().swapchain),
            );

        let swapchain = unsafe {
            context
                .swapchain_loader()
                .create_swapchain(&create_info, None)
                .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?
        };
        let handle = Shared::new(
            SwapchainResource {
                context: context.clone(),
                swapchain,
            },
            "swapchain",
        );

        let images = unsafe {
            context
                .swapchain_loader()
                .get_swapchain_images(swapchain)
                .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?
        };

        let image_views = images
            .iter()
            .enumerate()
            .map(|(i, &image)| {
                ImageView::for_swapchain_image(
                    context,
                    image,
                    format.format,
                    &format!("swapchain image view {i}"),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_images = (0..images.len())
            .map(|i| {
                Image::new(
                    context,
                    ImageInit {
                        extent: vk::Extent3D {
                            width: extent.width,
                            height: extent.height,
                            depth: 1,
                        },
                        format: depth_format,
                        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                        location: MemoryLocation::GpuOnly,
                        label: &format!("swapchain depth image {i}"),
                        ..Default::default()
                    },
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_views = depth_images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                ImageView::new(
                    context,
                    ImageViewInit {
                        image: image.clone(),
                        view_type: vk::ImageViewType::TYPE_2D,
                        aspect_mask: depth_aspect(depth_format),
                        label: &format!("swapchain depth view {i}"),
                    },
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let framebuffers = image_views
            .iter()
            .zip(&depth_views)
            .enumerate()
            .map(|(i, (color, depth))| {
                Framebuffer::new(
                    context,
                    FramebufferInit {
                        render_pass: render_pass.clone(),
                        attachments: vec![color.clone(), depth.clone()],
                        extent,
                        layers: 1,
                        label: &format!("swapchain framebuffer {i}"),
                    },
                )
            })
            .collect::<Result<Vec<_>>>()?;

        debug_assert!(
            images.len() == image_views.len()
                && images.len() == depth_images.len()
                && images.len() == framebuffers.len(),
            "per-image resource counts must match the image count"
        );

        tracing::info!(
            "Swapchain created: {}x{}, {} images, {:?}/{:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode,
        );

        Ok(Self {
            framebuffers,
            depth_views,
            depth_images,
            image_views,
            images,
            handle,
            format,
            depth_format,
            extent,
            min_image_count: image_count,
            context: context.clone(),
        })
    }

    /// Acquire the next presentable image, signaling `image_available`
    /// when it is ready to be written.
    pub fn acquire_next_image(&self, image_available: &Semaphore) -> Result<Acquire> {
        let result = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                self.handle.resource().swapchain,
                u64::MAX,
                image_available.raw(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(Acquire::Ready {
                image_index,
                suboptimal,
            }),
            // No image was acquired; the caller must rebuild the chain.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(e) => Err(GpuError::native("vkAcquireNextImageKHR", "swapchain", e)),
        }
    }

    /// Present an acquired image on the graphics queue.
    pub fn present(&self, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<PresentOutcome> {
        let swapchains = [self.handle.resource().swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.context
                .swapchain_loader()
                .queue_present(self.context.queue(QueueRole::Graphics), &present_info)
        };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(GpuError::native("vkQueuePresentKHR", "swapchain", e)),
        }
    }

    /// Number of presentable images in the chain.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// The presentable image at the given index.
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Framebuffer targeting the presentable image at the given index.
    pub fn framebuffer(&self, index: usize) -> &Framebuffer {
        &self.framebuffers[index]
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }
}

/// Pick the surface format, preferring 8-bit BGRA sRGB with an explicit
/// nonlinear color space and falling back to the first supported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return *format;
        }
    }

    available[0]
}

/// Pick the present mode, preferring low-latency triple buffering and
/// falling back to FIFO, which is always supported.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    for &mode in available {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
    }
    vk::PresentModeKHR::FIFO
}

/// Pick the swapchain extent: the capability-reported current extent
/// unless it is the "any size" sentinel, in which case the drawable size
/// is clamped into the supported bounds.
pub fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Pick the image count: one more than the minimum, clamped to the
/// maximum when the surface reports one (zero means unlimited).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// Probe the candidate depth formats in order and pick the first the
/// predicate accepts.
pub fn select_depth_format(supported: impl Fn(vk::Format) -> bool) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&f| supported(f))
}

/// Find a depth format usable as an optimal-tiling depth-stencil
/// attachment on the context's adapter.
pub fn find_depth_format(context: &GpuContext) -> Result<vk::Format> {
    select_depth_format(|format| {
        let props = unsafe {
            context
                .instance()
                .get_physical_device_format_properties(context.physical_device(), format)
        };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .ok_or(GpuError::NoDepthFormat)
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        current: vk::Extent2D,
        min: vk::Extent2D,
        max: vk::Extent2D,
        min_count: u32,
        max_count: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: min,
            max_image_extent: max,
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(select_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert_eq!(
            select_surface_format(&formats).format,
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn prefers_mailbox_falls_back_to_fifo() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let capabilities = caps(
            vk::Extent2D { width: 1280, height: 720 },
            vk::Extent2D { width: 1, height: 1 },
            vk::Extent2D { width: 4096, height: 4096 },
            2,
            0,
        );
        let extent = select_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn extent_clamps_drawable_on_any_size_sentinel() {
        let capabilities = caps(
            vk::Extent2D { width: u32::MAX, height: u32::MAX },
            vk::Extent2D { width: 640, height: 480 },
            vk::Extent2D { width: 1920, height: 1080 },
            2,
            0,
        );

        // Restored from minimized to 800x600: the chain takes the drawable
        // size exactly.
        let extent = select_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (800, 600));

        // Oversized drawables clamp into the supported bounds.
        let extent = select_extent(&capabilities, vk::Extent2D { width: 10_000, height: 10 });
        assert_eq!((extent.width, extent.height), (1920, 480));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        let unlimited = caps(
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            2,
            0,
        );
        assert_eq!(select_image_count(&unlimited), 3);

        let capped = caps(
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            vk::Extent2D::default(),
            2,
            2,
        );
        assert_eq!(select_image_count(&capped), 2);
    }

    #[test]
    fn depth_format_prefers_earliest_candidate() {
        let format = select_depth_format(|f| f == vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(format, Some(vk::Format::D24_UNORM_S8_UINT));

        let format = select_depth_format(|_| true);
        assert_eq!(format, Some(vk::Format::D32_SFLOAT));

        assert_eq!(select_depth_format(|_| false), None);
    }

    #[test]
    fn stencil_formats_widen_the_view_aspect() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
