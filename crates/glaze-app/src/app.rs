//! `GlazeApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use crate::time::Time;
use glaze_platform::Event;

/// Trait for Glaze applications.
///
/// Implement this to get a window, a GPU context, and a presentation
/// cycle without the boilerplate: the runner drives per-frame
/// synchronization, image acquisition, submission, presentation, and
/// swapchain rebuilds.
pub trait GlazeApp: Sized {
    /// Initialize the application.
    ///
    /// Called once, after the window, GPU context, default render pass
    /// and swapchain have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every tick before rendering with the events collected
    /// since the previous tick. The event list is transient; it is
    /// cleared and refilled every tick.
    fn update(&mut self, ctx: &mut AppContext, events: &[Event], time: &Time);

    /// Record rendering commands for one frame.
    ///
    /// The recorder has an open recording session; open (and close) a
    /// render pass as needed; `FrameContext::begin_default_render_pass`
    /// targets the acquired swapchain image. Submission, presentation
    /// and frame advancement happen after this returns.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()>;

    /// Handle a completed swapchain rebuild (after a resize).
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cleanup before shutdown. The device is idle when this is called.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
