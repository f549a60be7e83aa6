//! Per-frame rendering context.

use crate::time::Time;
use ash::vk;
use glaze_gpu::{CommandRecorder, Framebuffer, RenderPass};

/// Everything `render` needs for the frame in flight: the slot's
/// recorder (already recording), the acquired image, and the default
/// render pass targets for it.
pub struct FrameContext<'a> {
    /// The recording session for this frame's command buffer.
    pub recorder: &'a mut CommandRecorder,
    /// Index of the acquired presentable image. Distinct from
    /// `frame_slot`; the two count in different modulo spaces.
    pub image_index: u32,
    /// Index of the in-flight frame slot serving this frame.
    pub frame_slot: usize,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
    /// Frame timing.
    pub time: Time,
    pub(crate) render_pass: &'a RenderPass,
    pub(crate) framebuffer: &'a Framebuffer,
}

impl FrameContext<'_> {
    /// Open the default render pass over the acquired image, clearing to
    /// the given color, and set the viewport/scissor to the full extent.
    pub fn begin_default_render_pass(
        &mut self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> &mut CommandRecorder {
        self.recorder
            .begin_render_pass(self.render_pass, self.framebuffer, [r, g, b, a])
            .set_viewport_scissor(self.extent)
    }
}
