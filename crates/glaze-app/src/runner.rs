//! Application runner and event loop.
//!
//! Drives the presentation cycle once per tick: wait on the frame slot,
//! acquire a presentable image (rebuilding the swapchain on staleness),
//! hand the slot's recorder to the application, submit, present, and
//! advance the frame counter.

use std::time::Instant;

use ash::vk;
use glaze_gpu::{
    Acquire, CommandRecorder, GpuContextBuilder, PresentOutcome, SubmitSync, QueueRole,
    MAX_FRAMES_IN_FLIGHT,
};
use glaze_platform::event::translate_window_event;
use glaze_platform::{Event, Mods, Window, WindowConfig, WindowMode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::app::GlazeApp;
use crate::context::AppContext;
use crate::frame::FrameContext;
use crate::time::Time;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Window display mode.
    pub mode: WindowMode,
    /// Whether the window is resizable.
    pub resizable: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "glaze".to_string(),
            width: 800,
            height: 600,
            mode: WindowMode::Windowed,
            resizable: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the window display mode.
    pub fn with_mode(mut self, mode: WindowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set whether the window is resizable.
    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run a `GlazeApp` with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the application exits. Failures during creation or
/// rendering are logged and terminate the process; the layer has no
/// partial-failure mode for them.
pub fn run_app<A: GlazeApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().map_err(|e| anyhow::anyhow!("event loop: {e}"))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        events: Vec::new(),
        mods: Mods::empty(),
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner implementing winit's `ApplicationHandler`.
struct AppRunner<A: GlazeApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// Events collected since the previous tick; drained every tick.
    events: Vec<Event>,
    mods: Mods,
}

/// Internal application state.
struct AppState<A: GlazeApp> {
    ctx: AppContext,
    /// One recorder per in-flight frame slot.
    recorders: Vec<CommandRecorder>,
    app: A,
    time: Time,
    started: Instant,
}

impl<A: GlazeApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.mods = modifiers.state().into();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e}");
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let close = if let Some(state) = &mut self.state {
                    match state.tick(&mut self.events) {
                        Ok(keep_running) => !keep_running,
                        Err(e) => {
                            // Fail fast: a broken frame loop has no
                            // recovery path.
                            error!("Render error: {e}");
                            true
                        }
                    }
                } else {
                    false
                };

                if close {
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    event_loop.exit();
                } else if let Some(state) = &self.state {
                    state.ctx.window.request_redraw();
                }
            }
            other => translate_window_event(&other, self.mods, &mut self.events),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: GlazeApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window = Window::create(
            event_loop,
            &WindowConfig {
                width: self.config.width,
                height: self.config.height,
                title: self.config.title.clone(),
                mode: self.config.mode,
                resizable: self.config.resizable,
                ..Default::default()
            },
        )?;

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build(&window)?;

        info!("GPU: {}", gpu.adapter().summary());

        let recorders = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| CommandRecorder::new(&gpu, format!("frame recorder {slot}")))
            .collect::<glaze_gpu::Result<Vec<_>>>()?;

        let mut ctx = AppContext::new(window, gpu)?;
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            ctx,
            recorders,
            app,
            time: Time::default(),
            started: Instant::now(),
        })
    }
}

impl<A: GlazeApp> AppState<A> {
    /// Run one presentation cycle. Returns `false` when the app asked to
    /// close.
    fn tick(&mut self, pending_events: &mut Vec<Event>) -> anyhow::Result<bool> {
        if !self.ctx.window.is_open() {
            return Ok(false);
        }

        // Minimized: nothing to present until the drawable comes back.
        let (width, height) = self.ctx.window.drawable_extent();
        if width == 0 || height == 0 {
            pending_events.clear();
            return Ok(true);
        }

        self.time.update(self.started.elapsed().as_secs_f64());

        let events: Vec<Event> = pending_events.drain(..).collect();
        self.app.update(&mut self.ctx, &events, &self.time);

        // Gate on the slot's previous submission before reusing its
        // synchronization objects.
        self.ctx.sync.wait_current()?;

        let slot = self.ctx.sync.current_slot();
        let image_index = match self
            .ctx
            .swapchain
            .acquire_next_image(&self.ctx.sync.current().image_available)?
        {
            Acquire::Ready { image_index, .. } => image_index,
            Acquire::OutOfDate => {
                self.ctx.recreate_swapchain()?;
                return Ok(true);
            }
        };
        // Only reset the fence once an image is actually in hand.
        self.ctx.sync.reset_current()?;

        let recorder = &mut self.recorders[slot];
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        let mut frame = FrameContext {
            recorder,
            image_index,
            frame_slot: slot,
            extent: self.ctx.swapchain.extent(),
            time: self.time,
            render_pass: &self.ctx.render_pass,
            framebuffer: self.ctx.swapchain.framebuffer(image_index as usize),
        };
        self.app.render(&self.ctx, &mut frame)?;

        let frame_sync = self.ctx.sync.current();
        let submit_sync = SubmitSync::new()
            .wait(
                &frame_sync.image_available,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )
            .signal(&frame_sync.render_finished)
            .fence(&frame_sync.in_flight);
        self.recorders[slot].submit(QueueRole::Graphics, &submit_sync)?;

        let outcome = self
            .ctx
            .swapchain
            .present(image_index, &[frame_sync.render_finished.raw()])?;
        if outcome == PresentOutcome::Stale {
            self.ctx.recreate_swapchain()?;
        }

        self.ctx.sync.advance();

        Ok(true)
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        if self.ctx.recreate_swapchain()? {
            self.app.on_resize(&mut self.ctx, width, height)?;
            info!("Resized to {}x{}", width, height);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);
        info!(
            "Cleanup complete after {} frames",
            self.ctx.sync.frame_count()
        );
    }
}
