//! Texture upload.
//!
//! Decoding goes through the `image` crate; this layer only uploads the
//! already-decoded pixels through a staging buffer.

use crate::buffer::{Buffer, BufferInit};
use crate::command::{CommandRecorder, SubmitSync};
use crate::context::{GpuContext, QueueRole};
use crate::error::{GpuError, Result};
use crate::image::{Image, ImageInit, ImageView, ImageViewInit};
use crate::memory::MemoryLocation;
use ash::vk;
use std::path::Path;
use std::sync::Arc;

/// Immutable configuration for texture creation.
pub struct TextureInit<'a> {
    format: vk::Format,
    bytes_per_pixel: usize,
    extent: Option<vk::Extent2D>,
    pixels: Option<Vec<u8>>,
    label: &'a str,
}

impl Default for TextureInit<'_> {
    fn default() -> Self {
        Self {
            format: vk::Format::R8G8B8A8_SRGB,
            bytes_per_pixel: 4,
            extent: None,
            pixels: None,
            label: "unnamed texture",
        }
    }
}

impl<'a> TextureInit<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    /// Set the pixel format and its size in bytes per pixel.
    pub fn format(mut self, format: vk::Format, bytes_per_pixel: usize) -> Self {
        self.format = format;
        self.bytes_per_pixel = bytes_per_pixel;
        self
    }

    /// Decode an image file into RGBA8 pixels.
    ///
    /// A file that fails to decode logs a warning and leaves this
    /// configuration unmodified; check `has_pixels` before `init`.
    pub fn load_from_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match image::open(path) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                let (width, height) = rgba.dimensions();
                self.extent = Some(vk::Extent2D { width, height });
                self.pixels = Some(rgba.into_raw());
            }
            Err(e) => {
                tracing::warn!(
                    "Texture image failed to decode, configuration left unmodified: path = {}, {e}",
                    path.display()
                );
            }
        }
        self
    }

    /// Use raw pixels already decoded by the caller.
    pub fn pixels(mut self, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        self.extent = Some(vk::Extent2D { width, height });
        self.pixels = Some(pixels);
        self
    }

    /// Whether a pixel source has been supplied.
    pub fn has_pixels(&self) -> bool {
        self.pixels.is_some() && self.extent.is_some()
    }

    /// Upload the pixels into a sampled image, returning the image and a
    /// 2D color view over it.
    pub fn init(self, context: &Arc<GpuContext>) -> Result<(Image, ImageView)> {
        let (Some(extent), Some(pixels)) = (self.extent, self.pixels) else {
            return Err(GpuError::InvalidState(format!(
                "texture {} has no pixel source",
                self.label
            )));
        };

        let expected = extent.width as usize * extent.height as usize * self.bytes_per_pixel;
        if pixels.len() != expected {
            return Err(GpuError::InvalidState(format!(
                "texture {} pixel data is {} bytes, expected {expected}",
                self.label,
                pixels.len(),
            )));
        }

        let image = Image::new(
            context,
            ImageInit {
                extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
                format: self.format,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                location: MemoryLocation::GpuOnly,
                label: &format!("{} image", self.label),
                ..Default::default()
            },
        )?;

        let staging = Buffer::<u8>::new(
            context,
            BufferInit {
                usage: vk::BufferUsageFlags::TRANSFER_SRC,
                location: MemoryLocation::CpuToGpu,
                data: Some(&pixels),
                label: &format!("{} staging buffer", self.label),
                ..Default::default()
            },
        )?;

        let color_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let mut recorder = CommandRecorder::new(context, format!("{} upload", self.label))?;
        recorder
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?
            .transition_image_layout(
                &image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                color_range,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            )
            .copy_buffer_to_image(&staging, &image, vk::ImageAspectFlags::COLOR, 0, 0, 1)
            .transition_image_layout(
                &image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                color_range,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            );
        recorder.submit(QueueRole::Transfer, &SubmitSync::new())?;

        let view = ImageView::new(
            context,
            ImageViewInit {
                image: image.clone(),
                view_type: vk::ImageViewType::TYPE_2D,
                aspect_mask: vk::ImageAspectFlags::COLOR,
                label: &format!("{} view", self.label),
            },
        )?;

        Ok((image, view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_decode_leaves_init_unmodified() {
        let init = TextureInit::new("missing").load_from_file("/nonexistent/texture.png");
        assert!(!init.has_pixels());
    }

    #[test]
    fn raw_pixels_are_accepted() {
        let init = TextureInit::new("raw").pixels(2, 2, vec![0u8; 16]);
        assert!(init.has_pixels());
    }
}
