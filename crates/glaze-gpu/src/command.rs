//! Command recording sessions.
//!
//! A `CommandRecorder` is a fluent recording session over one primary
//! command buffer. Recording legality is tracked explicitly: any command
//! needs an open `begin()`, render-pass-scoped commands additionally need
//! an open render pass, and `submit` closes whatever the caller forgot to.

use crate::buffer::{element_bytes, Buffer};
use crate::context::{GpuContext, QueueRole};
use crate::error::{GpuError, Result};
use crate::descriptors::DescriptorSet;
use crate::framebuffer::Framebuffer;
use crate::image::Image;
use crate::pipeline::Pipeline;
use crate::render_pass::RenderPass;
use crate::sync::{Fence, Semaphore};
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

/// Recording-session legality tracking.
///
/// `Initial → Recording → (RenderPassOpen ⇄ Recording) → Ended`;
/// violations are programmer errors and are checked in debug builds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecorderState {
    recording: bool,
    in_render_pass: bool,
}

impl RecorderState {
    pub(crate) fn begin(&mut self) {
        debug_assert!(
            !self.recording,
            "Can't begin recording when the command buffer is already recording!"
        );
        self.recording = true;
    }

    pub(crate) fn end(&mut self) {
        debug_assert!(self.recording, "Can't end a command buffer if it's not recording!");
        self.recording = false;
    }

    pub(crate) fn enter_render_pass(&mut self) {
        self.require_recording();
        debug_assert!(
            !self.in_render_pass,
            "Can't begin a render pass when another has already begun!"
        );
        self.in_render_pass = true;
    }

    pub(crate) fn leave_render_pass(&mut self) {
        debug_assert!(self.in_render_pass, "Can't end a render pass when one hasn't begun!");
        self.in_render_pass = false;
    }

    pub(crate) fn require_recording(self) {
        debug_assert!(
            self.recording,
            "Commands can't be recorded without first calling begin()!"
        );
    }

    pub(crate) fn require_render_pass(self) {
        debug_assert!(
            self.in_render_pass,
            "Render pass dependent commands need an open render pass!"
        );
    }

    pub(crate) fn recording(self) -> bool {
        self.recording
    }

    pub(crate) fn in_render_pass(self) -> bool {
        self.in_render_pass
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Synchronization objects a submission waits on, signals, and fences.
#[derive(Default)]
pub struct SubmitSync {
    wait: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal: Vec<vk::Semaphore>,
    fence: vk::Fence,
}

impl SubmitSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait on a semaphore before the given pipeline stage executes.
    pub fn wait(mut self, semaphore: &Semaphore, stage: vk::PipelineStageFlags) -> Self {
        self.wait.push(semaphore.raw());
        self.wait_stages.push(stage);
        self
    }

    /// Signal a semaphore when the submission completes.
    pub fn signal(mut self, semaphore: &Semaphore) -> Self {
        self.signal.push(semaphore.raw());
        self
    }

    /// Signal a fence when the submission completes.
    pub fn fence(mut self, fence: &Fence) -> Self {
        self.fence = fence.raw();
        self
    }
}

/// Vertex buffers bound together in one call, with per-buffer offsets
/// counted in elements of each buffer's type.
#[derive(Default)]
pub struct VertexBufferBindings {
    buffers: Vec<vk::Buffer>,
    offsets: Vec<vk::DeviceSize>,
}

impl VertexBufferBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_buffer<T: Pod>(mut self, buffer: &Buffer<T>, offset: usize) -> Self {
        self.buffers.push(buffer.raw());
        self.offsets.push(element_bytes::<T>(offset));
        self
    }
}

/// A recording session over one primary command buffer.
pub struct CommandRecorder {
    context: Arc<GpuContext>,
    cmd: vk::CommandBuffer,
    state: RecorderState,
    label: String,
}

impl CommandRecorder {
    /// Allocate a command buffer from the context's pool.
    pub fn new(context: &Arc<GpuContext>, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(context.command_pool())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe {
            context
                .device()
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| GpuError::native("vkAllocateCommandBuffers", &label, e))?
        };

        Ok(Self {
            context: context.clone(),
            cmd: buffers[0],
            state: RecorderState::default(),
            label,
        })
    }

    /// Get the raw command buffer handle.
    pub fn raw(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Begin recording.
    pub fn begin(&mut self, usage: vk::CommandBufferUsageFlags) -> Result<&mut Self> {
        self.state.begin();

        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe {
            self.context
                .device()
                .begin_command_buffer(self.cmd, &begin_info)
                .map_err(|e| GpuError::native("vkBeginCommandBuffer", &self.label, e))?;
        }
        Ok(self)
    }

    /// End recording.
    pub fn end(&mut self) -> Result<&mut Self> {
        self.state.end();
        unsafe {
            self.context
                .device()
                .end_command_buffer(self.cmd)
                .map_err(|e| GpuError::native("vkEndCommandBuffer", &self.label, e))?;
        }
        Ok(self)
    }

    /// Begin a render pass over the given framebuffer, clearing color and
    /// depth attachments.
    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        framebuffer: &Framebuffer,
        clear_color: [f32; 4],
    ) -> &mut Self {
        self.state.enter_render_pass();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.raw())
            .framebuffer(framebuffer.raw())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: framebuffer.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            self.context.device().cmd_begin_render_pass(
                self.cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        self
    }

    /// End the open render pass.
    pub fn end_render_pass(&mut self) -> &mut Self {
        self.state.leave_render_pass();
        unsafe {
            self.context.device().cmd_end_render_pass(self.cmd);
        }
        self
    }

    /// Advance to the next subpass of the open render pass.
    pub fn next_subpass(&mut self) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context
                .device()
                .cmd_next_subpass(self.cmd, vk::SubpassContents::INLINE);
        }
        self
    }

    /// Bind a graphics pipeline.
    pub fn bind_graphics_pipeline(&mut self, pipeline: &Pipeline) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context.device().cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.raw(),
            );
        }
        self
    }

    /// Bind a compute pipeline.
    pub fn bind_compute_pipeline(&mut self, pipeline: &Pipeline) -> &mut Self {
        self.state.require_recording();
        unsafe {
            self.context.device().cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.raw(),
            );
        }
        self
    }

    /// Bind one vertex buffer at binding 0, offset in elements.
    pub fn bind_vertex_buffer<T: Pod>(&mut self, buffer: &Buffer<T>, offset: usize) -> &mut Self {
        self.state.require_render_pass();
        let buffers = [buffer.raw()];
        let offsets = [element_bytes::<T>(offset)];
        unsafe {
            self.context
                .device()
                .cmd_bind_vertex_buffers(self.cmd, 0, &buffers, &offsets);
        }
        self
    }

    /// Bind multiple vertex buffers starting at binding 0.
    pub fn bind_vertex_buffers(&mut self, bindings: &VertexBufferBindings) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context.device().cmd_bind_vertex_buffers(
                self.cmd,
                0,
                &bindings.buffers,
                &bindings.offsets,
            );
        }
        self
    }

    /// Bind an index buffer, offset in elements.
    pub fn bind_index_buffer<T: Pod>(
        &mut self,
        buffer: &Buffer<T>,
        index_type: vk::IndexType,
        offset: usize,
    ) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context.device().cmd_bind_index_buffer(
                self.cmd,
                buffer.raw(),
                element_bytes::<T>(offset),
                index_type,
            );
        }
        self
    }

    /// Bind descriptor sets for the pipeline's layout.
    pub fn bind_descriptor_sets(
        &mut self,
        pipeline: &Pipeline,
        bind_point: vk::PipelineBindPoint,
        sets: &[DescriptorSet],
    ) -> &mut Self {
        self.state.require_recording();
        let raw_sets: Vec<vk::DescriptorSet> = sets.iter().map(DescriptorSet::raw).collect();
        unsafe {
            self.context.device().cmd_bind_descriptor_sets(
                self.cmd,
                bind_point,
                pipeline.layout(),
                0,
                &raw_sets,
                &[],
            );
        }
        self
    }

    /// Push constants into the pipeline's layout.
    pub fn push_constants<T: Pod>(
        &mut self,
        pipeline: &Pipeline,
        stages: vk::ShaderStageFlags,
        constants: &T,
    ) -> &mut Self {
        self.state.require_recording();
        unsafe {
            self.context.device().cmd_push_constants(
                self.cmd,
                pipeline.layout(),
                stages,
                0,
                bytemuck::bytes_of(constants),
            );
        }
        self
    }

    /// Set the dynamic viewport and scissor to cover the given extent.
    pub fn set_viewport_scissor(&mut self, extent: vk::Extent2D) -> &mut Self {
        self.state.require_recording();
        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.context.device().cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.context.device().cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
        self
    }

    /// Draw primitives.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context.device().cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        self
    }

    /// Draw indexed primitives.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> &mut Self {
        self.state.require_render_pass();
        unsafe {
            self.context.device().cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        self
    }

    /// Dispatch compute work.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> &mut Self {
        self.state.require_recording();
        unsafe {
            self.context.device().cmd_dispatch(self.cmd, x, y, z);
        }
        self
    }

    /// Copy between element-typed buffers. `count` is in elements; `None`
    /// copies the full source, which then must match the destination size.
    pub fn copy_buffer<T: Pod>(
        &mut self,
        src: &Buffer<T>,
        dst: &Buffer<T>,
        count: Option<usize>,
        src_offset: usize,
        dst_offset: usize,
    ) -> &mut Self {
        self.state.require_recording();
        if count.is_none() {
            debug_assert!(
                src.len() == dst.len(),
                "Buffers must be the same size when performing a full copy!"
            );
        }
        let count = count.unwrap_or_else(|| src.len());
        debug_assert!(src_offset + count <= src.len(), "copy reads past the source");
        debug_assert!(dst_offset + count <= dst.len(), "copy writes past the destination");

        let copy = vk::BufferCopy::default()
            .src_offset(element_bytes::<T>(src_offset))
            .dst_offset(element_bytes::<T>(dst_offset))
            .size(element_bytes::<T>(count));

        unsafe {
            self.context
                .device()
                .cmd_copy_buffer(self.cmd, src.raw(), dst.raw(), &[copy]);
        }
        self
    }

    /// Copy a buffer's contents into an image's transfer-destination
    /// layout.
    pub fn copy_buffer_to_image<T: Pod>(
        &mut self,
        src: &Buffer<T>,
        dst: &Image,
        aspect_mask: vk::ImageAspectFlags,
        mip_level: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> &mut Self {
        self.state.require_recording();

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(aspect_mask)
                    .mip_level(mip_level)
                    .base_array_layer(base_layer)
                    .layer_count(layer_count),
            )
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(dst.extent());

        unsafe {
            self.context.device().cmd_copy_buffer_to_image(
                self.cmd,
                src.raw(),
                dst.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        self
    }

    /// Transition an image between layouts with an image memory barrier.
    #[allow(clippy::too_many_arguments)]
    pub fn transition_image_layout(
        &mut self,
        image: &Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        subresource_range: vk::ImageSubresourceRange,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) -> &mut Self {
        self.state.require_recording();

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.raw())
            .subresource_range(subresource_range)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.context.device().cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        self
    }

    /// Record an explicit execution/memory barrier.
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
    ) -> &mut Self {
        self.state.require_recording();
        unsafe {
            self.context.device().cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                memory_barriers,
                &[],
                &[],
            );
        }
        self
    }

    /// Escape hatch for native commands this layer does not wrap.
    pub fn raw_commands(&mut self, f: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> &mut Self {
        f(self.context.device(), self.cmd);
        self
    }

    /// Submit the session to the given queue role.
    ///
    /// An open render pass and an open recording are closed implicitly.
    /// After submission the call blocks until the target queue drains,
    /// then resets the command buffer for reuse; the deliberate
    /// throughput-for-simplicity trade this layer makes.
    pub fn submit(&mut self, role: QueueRole, sync: &SubmitSync) -> Result<()> {
        if self.state.in_render_pass() {
            self.end_render_pass();
        }
        if self.state.recording() {
            self.end()?;
        }

        let command_buffers = [self.cmd];
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&sync.wait)
            .wait_dst_stage_mask(&sync.wait_stages)
            .signal_semaphores(&sync.signal);

        let queue = self.context.queue(role);
        unsafe {
            self.context
                .device()
                .queue_submit(queue, &[submit_info], sync.fence)
                .map_err(|e| GpuError::native("vkQueueSubmit", &self.label, e))?;
            self.context
                .device()
                .queue_wait_idle(queue)
                .map_err(|e| GpuError::native("vkQueueWaitIdle", &self.label, e))?;
            self.context
                .device()
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| GpuError::native("vkResetCommandBuffer", &self.label, e))?;
        }

        self.state.reset();
        Ok(())
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device()
                .free_command_buffers(self.context.command_pool(), &[self.cmd]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_end_without_render_pass_is_legal() {
        let mut state = RecorderState::default();
        state.begin();
        state.require_recording();
        state.end();
        assert!(!state.recording());
        assert!(!state.in_render_pass());
    }

    #[test]
    fn render_pass_round_trip() {
        let mut state = RecorderState::default();
        state.begin();
        state.enter_render_pass();
        state.require_render_pass();
        state.leave_render_pass();
        assert!(state.recording());
        assert!(!state.in_render_pass());
        state.end();
    }

    #[test]
    fn submit_path_closes_open_scopes() {
        // Mirrors what submit() does before touching the queue.
        let mut state = RecorderState::default();
        state.begin();
        state.enter_render_pass();

        if state.in_render_pass() {
            state.leave_render_pass();
        }
        if state.recording() {
            state.end();
        }
        state.reset();
        assert_eq!(state, RecorderState::default());
    }

    #[test]
    fn recorder_is_reusable_after_reset() {
        let mut state = RecorderState::default();
        state.begin();
        state.end();
        state.reset();
        state.begin();
        assert!(state.recording());
    }

    #[test]
    #[should_panic(expected = "open render pass")]
    fn render_pass_commands_need_an_open_pass() {
        let mut state = RecorderState::default();
        state.begin();
        // A draw without begin_render_pass must trip the state check.
        state.require_render_pass();
    }

    #[test]
    #[should_panic(expected = "already recording")]
    fn double_begin_is_rejected() {
        let mut state = RecorderState::default();
        state.begin();
        state.begin();
    }

    #[test]
    #[should_panic(expected = "first calling begin()")]
    fn commands_need_an_open_recording() {
        let state = RecorderState::default();
        state.require_recording();
    }
}
