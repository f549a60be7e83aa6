//! Window creation.

use crate::monitor::{monitors, Monitor};
use crate::{PlatformError, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Fullscreen;

/// Only one window may exist per process; the surface, swapchain and
/// device context are all built against it.
static WINDOW_EXISTS: AtomicBool = AtomicBool::new(false);

struct WindowSlot;

impl WindowSlot {
    fn acquire() -> Result<Self> {
        if WINDOW_EXISTS
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PlatformError::WindowAlreadyExists);
        }
        Ok(Self)
    }
}

impl Drop for WindowSlot {
    fn drop(&mut self) {
        WINDOW_EXISTS.store(false, Ordering::Release);
    }
}

/// Window display modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    #[default]
    Windowed,
    Borderless,
    Fullscreen,
}

/// Which monitor a non-windowed mode targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorSelection {
    #[default]
    Primary,
    Index(usize),
}

/// Immutable window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub mode: WindowMode,
    pub resizable: bool,
    pub monitor: MonitorSelection,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "glaze".to_string(),
            mode: WindowMode::Windowed,
            resizable: true,
            monitor: MonitorSelection::Primary,
        }
    }
}

/// The application window.
pub struct Window {
    inner: Arc<winit::window::Window>,
    open: AtomicBool,
    _slot: WindowSlot,
}

impl Window {
    /// Create the process's window.
    ///
    /// Fails with [`PlatformError::WindowAlreadyExists`] when a window is
    /// already live.
    pub fn create(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let slot = WindowSlot::acquire()?;

        let monitor = match config.monitor {
            MonitorSelection::Primary => monitors(event_loop).into_iter().find(Monitor::is_primary),
            MonitorSelection::Index(index) => monitors(event_loop).into_iter().nth(index),
        };

        let fullscreen = match config.mode {
            WindowMode::Windowed => None,
            WindowMode::Borderless => {
                Some(Fullscreen::Borderless(monitor.as_ref().map(|m| m.handle().clone())))
            }
            WindowMode::Fullscreen => {
                // Exclusive mode needs a concrete video mode; fall back to
                // borderless when the monitor reports none.
                let video_mode = monitor
                    .as_ref()
                    .and_then(|m| m.handle().video_modes().next());
                match video_mode {
                    Some(mode) => Some(Fullscreen::Exclusive(mode)),
                    None => Some(Fullscreen::Borderless(
                        monitor.as_ref().map(|m| m.handle().clone()),
                    )),
                }
            }
        };

        let attributes = winit::window::Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable)
            .with_fullscreen(fullscreen);

        let inner = event_loop
            .create_window(attributes)
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

        tracing::info!(
            "Window created: {}x{} \"{}\"",
            config.width,
            config.height,
            config.title
        );

        Ok(Self {
            inner: Arc::new(inner),
            open: AtomicBool::new(true),
            _slot: slot,
        })
    }

    /// The window's drawable size in physical pixels. Zero while the
    /// window is minimized.
    pub fn drawable_extent(&self) -> (u32, u32) {
        let size = self.inner.inner_size();
        (size.width, size.height)
    }

    pub fn set_title(&self, title: &str) {
        self.inner.set_title(title);
    }

    pub fn set_size(&self, width: u32, height: u32) {
        let _ = self.inner.request_inner_size(PhysicalSize::new(width, height));
    }

    /// Ask the runner to shut down after the current tick.
    pub fn request_close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Schedule another redraw; the runner drives ticks off redraws.
    pub fn request_redraw(&self) {
        self.inner.request_redraw();
    }

    /// Access the underlying winit window.
    pub fn winit(&self) -> &winit::window::Window {
        &self.inner
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.inner.display_handle()
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.inner.window_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_slot_is_exclusive_until_released() {
        let first = WindowSlot::acquire().expect("slot free");
        assert!(matches!(
            WindowSlot::acquire(),
            Err(PlatformError::WindowAlreadyExists)
        ));

        drop(first);
        let second = WindowSlot::acquire().expect("slot released");
        drop(second);
    }
}
