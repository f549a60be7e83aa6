//! Application context.

use std::sync::Arc;

use ash::vk;
use glaze_gpu::swapchain::{select_surface_format, Swapchain};
use glaze_gpu::{find_depth_format, FrameSyncManager, GpuContext, RenderPass};
use glaze_platform::Window;

/// Long-lived state shared across all app methods: the window, the GPU
/// context, the default render pass, the swapchain, and the frame slots.
pub struct AppContext {
    /// The window handle.
    pub window: Window,
    pub(crate) gpu: Arc<GpuContext>,
    pub(crate) render_pass: RenderPass,
    pub(crate) swapchain: Swapchain,
    pub(crate) sync: FrameSyncManager,
}

impl AppContext {
    /// Build the context for an existing window and GPU context.
    pub(crate) fn new(window: Window, gpu: Arc<GpuContext>) -> anyhow::Result<Self> {
        // The surface format is chosen once, here, and pinned for every
        // later swapchain rebuild; the default render pass bakes it in
        // and is never rebuilt on resize.
        let support = gpu.surface_support()?;
        let surface_format = select_surface_format(&support.formats);
        let depth_format = find_depth_format(&gpu)?;

        let render_pass = RenderPass::default_for(&gpu, surface_format.format, depth_format)?;

        let (width, height) = window.drawable_extent();
        let drawable = vk::Extent2D {
            width: width.max(1),
            height: height.max(1),
        };

        let swapchain = Swapchain::new(
            &gpu,
            drawable,
            &render_pass,
            depth_format,
            Some(surface_format),
            None,
        )?;

        let sync = FrameSyncManager::new(&gpu)?;

        Ok(Self {
            window,
            gpu,
            render_pass,
            swapchain,
            sync,
        })
    }

    /// The shared GPU context.
    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// The default render pass every swapchain framebuffer targets.
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// The current swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Synchronization slots and the frame counter.
    pub fn frame_sync(&self) -> &FrameSyncManager {
        &self.sync
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn width(&self) -> u32 {
        self.swapchain.extent().width
    }

    pub fn height(&self) -> u32 {
        self.swapchain.extent().height
    }

    /// Aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    /// Total frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.sync.frame_count()
    }

    /// Rebuild the swapchain against the window's current drawable size.
    ///
    /// Returns `false` without rebuilding while the drawable size is zero
    /// (minimized window); the runner retries on the next tick. The old
    /// chain is passed as a reuse hint and destroyed only after the
    /// replacement is fully built. Frame slots and the default render
    /// pass are untouched.
    pub(crate) fn recreate_swapchain(&mut self) -> anyhow::Result<bool> {
        let (width, height) = self.window.drawable_extent();
        if width == 0 || height == 0 {
            return Ok(false);
        }

        self.gpu.wait_idle()?;

        let replacement = Swapchain::new(
            &self.gpu,
            vk::Extent2D { width, height },
            &self.render_pass,
            self.swapchain.depth_format(),
            Some(self.swapchain.format()),
            Some(&self.swapchain),
        )?;
        self.swapchain = replacement;

        tracing::info!("Swapchain recreated: {width}x{height}");
        Ok(true)
    }
}
