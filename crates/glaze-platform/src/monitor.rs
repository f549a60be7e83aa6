//! Monitor enumeration.

use winit::event_loop::ActiveEventLoop;
use winit::monitor::MonitorHandle;

/// A connected monitor.
#[derive(Debug, Clone)]
pub struct Monitor {
    handle: MonitorHandle,
    index: usize,
    primary: bool,
}

impl Monitor {
    pub(crate) fn new(handle: MonitorHandle, index: usize, primary: bool) -> Self {
        Self {
            handle,
            index,
            primary,
        }
    }

    /// The monitor's name, when the platform reports one.
    pub fn name(&self) -> Option<String> {
        self.handle.name()
    }

    /// Position in the enumeration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this is the primary monitor.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Current resolution in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        let size = self.handle.size();
        (size.width, size.height)
    }

    /// Position of the monitor in the virtual desktop.
    pub fn position(&self) -> (i32, i32) {
        let pos = self.handle.position();
        (pos.x, pos.y)
    }

    /// The platform's UI scale factor for this monitor.
    pub fn scale_factor(&self) -> f64 {
        self.handle.scale_factor()
    }

    pub(crate) fn handle(&self) -> &MonitorHandle {
        &self.handle
    }
}

/// Enumerate connected monitors.
pub fn monitors(event_loop: &ActiveEventLoop) -> Vec<Monitor> {
    let primary = event_loop.primary_monitor();
    event_loop
        .available_monitors()
        .enumerate()
        .map(|(index, handle)| {
            let is_primary = primary.as_ref() == Some(&handle);
            Monitor::new(handle, index, is_primary)
        })
        .collect()
}
