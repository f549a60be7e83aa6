//! Window-system surface plumbing.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// The presentable surface and the instance-level extension loader
/// needed to query it.
pub(crate) struct SurfaceContext {
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for the window behind the raw handles.
    ///
    /// # Safety
    /// The handles must belong to a live window that outlives the surface.
    pub(crate) unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let surface = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
        };
        let loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self { surface, loader })
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// A fresh snapshot of what the surface supports. Capabilities can change
/// after a resize, so this is re-queried on every swapchain build.
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query current surface support from the adapter.
    ///
    /// # Safety
    /// All handles must be valid.
    pub(crate) unsafe fn query(
        loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats =
            unsafe { loader.get_physical_device_surface_formats(physical_device, surface)? };
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}
