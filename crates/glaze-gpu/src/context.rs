//! GPU context management.

use crate::capabilities::AdapterInfo;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_adapter};
use crate::memory::GpuAllocator;
use crate::surface::{SurfaceContext, SurfaceSupport};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

/// Queue roles exposed by the context, in fixed order.
///
/// All roles draw from one queue family (the one that supports graphics,
/// compute and presentation together). When the family offers fewer queues
/// than there are roles, the trailing roles alias the last created queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Transfer,
    Compute,
    Graphics,
}

impl QueueRole {
    pub(crate) const COUNT: usize = 3;

    const fn index(self) -> usize {
        match self {
            Self::Transfer => 0,
            Self::Compute => 1,
            Self::Graphics => 2,
        }
    }
}

/// Clamp a role index onto the queues that actually exist.
pub(crate) fn resolve_queue_index(role_index: usize, available: usize) -> usize {
    debug_assert!(available > 0, "at least one queue must exist");
    role_index.min(available - 1)
}

/// Immutable configuration for context creation.
pub(crate) struct ContextConfig {
    pub app_name: String,
    pub engine_name: String,
    pub app_version: u32,
    pub engine_version: u32,
    pub api_version: u32,
    pub validation: bool,
    pub device_extensions: Vec<&'static CStr>,
    pub features: vk::PhysicalDeviceFeatures,
}

/// Main GPU context holding the instance, device, queues, allocator, and
/// command pool. Shared by reference: every resource handle keeps an
/// `Arc<GpuContext>`, so the context provably outlives everything created
/// from it and is torn down only when the last owner releases it.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface: SurfaceContext,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) adapter: AdapterInfo,
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) queue_family: u32,
    pub(crate) queues: Vec<vk::Queue>,
    pub(crate) command_pool: vk::CommandPool,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get properties of the selected adapter.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Get the queue serving the given role.
    pub fn queue(&self, role: QueueRole) -> vk::Queue {
        self.queues[resolve_queue_index(role.index(), self.queues.len())]
    }

    /// Get the queue family index all roles draw from.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Get access to the GPU allocator.
    pub(crate) fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Get the command pool command recorders allocate from.
    pub(crate) fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Get the raw surface handle.
    pub(crate) fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    pub(crate) fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface.loader
    }

    pub(crate) fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Query the surface's current capabilities, formats and present modes.
    pub fn surface_support(&self) -> Result<SurfaceSupport> {
        unsafe {
            SurfaceSupport::query(&self.surface.loader, self.physical_device, self.surface.surface)
        }
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all device memory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface.destroy();
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    config: ContextConfig,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            config: ContextConfig {
                app_name: "glaze".to_string(),
                engine_name: "glaze".to_string(),
                app_version: vk::make_api_version(0, 1, 0, 0),
                engine_version: vk::make_api_version(0, 1, 0, 0),
                api_version: vk::API_VERSION_1_3,
                validation: cfg!(debug_assertions),
                device_extensions: vec![],
                features: vk::PhysicalDeviceFeatures::default(),
            },
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the application version.
    pub fn app_version(mut self, version: u32) -> Self {
        self.config.app_version = version;
        self
    }

    /// Set the engine name.
    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.config.engine_name = name.into();
        self
    }

    /// Set the engine version.
    pub fn engine_version(mut self, version: u32) -> Self {
        self.config.engine_version = version;
        self
    }

    /// Set the requested Vulkan API version.
    pub fn api_version(mut self, version: u32) -> Self {
        self.config.api_version = version;
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.config.validation = enable;
        self
    }

    /// Request an additional device extension.
    pub fn device_extension(mut self, name: &'static CStr) -> Self {
        self.config.device_extensions.push(name);
        self
    }

    /// Request a set of device features; adapters missing any of them are
    /// discarded during selection.
    pub fn features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.config.features = features;
        self
    }

    /// Build the GPU context against the given window.
    pub fn build<W>(self, window: &W) -> Result<Arc<GpuContext>>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let config = self.config;

        let display_handle = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?
            .as_raw();

        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance = unsafe { create_instance(&entry, &config, display_handle)? };

        // The surface has to exist before adapter selection so present
        // support is part of the suitability check.
        let surface =
            unsafe { SurfaceContext::new(&entry, &instance, display_handle, window_handle)? };

        let pick = unsafe { select_adapter(&instance, &surface.loader, surface.surface, &config)? };

        tracing::info!("Selected GPU: {}", pick.info.summary());

        let (device, queues) = unsafe { create_device(&instance, &pick, &config)? };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let allocator =
            unsafe { GpuAllocator::new(&instance, device.clone(), pick.physical_device)? };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(pick.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(|e| GpuError::native("vkCreateCommandPool", &config.app_name, e))?
        };

        Ok(Arc::new(GpuContext {
            entry,
            instance,
            surface,
            physical_device: pick.physical_device,
            adapter: pick.info,
            device,
            swapchain_loader,
            allocator: Mutex::new(allocator),
            queue_family: pick.queue_family,
            queues,
            command_pool,
        }))
    }
}

/// Create the logical device and retrieve one queue per role, capped by
/// what the family physically offers.
///
/// # Safety
/// The instance and the picked physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    pick: &crate::instance::AdapterPick,
    config: &ContextConfig,
) -> Result<(ash::Device, Vec<vk::Queue>)> {
    let queue_count = QueueRole::COUNT.min(pick.queue_count as usize).max(1);
    let priorities = vec![1.0_f32; queue_count];

    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(pick.queue_family)
        .queue_priorities(&priorities);
    let queue_create_infos = [queue_create_info];

    let mut extensions: Vec<*const i8> = vec![ash::khr::swapchain::NAME.as_ptr()];
    extensions.extend(config.device_extensions.iter().map(|e| e.as_ptr()));

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&config.features);

    let device = unsafe {
        instance
            .create_device(pick.physical_device, &device_create_info, None)
            .map_err(|e| GpuError::native("vkCreateDevice", &pick.info.device_name, e))?
    };

    let queues: Vec<vk::Queue> = (0..queue_count)
        .map(|i| unsafe { device.get_device_queue(pick.queue_family, i as u32) })
        .collect();

    Ok((device, queues))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_within_bounds_resolve_directly() {
        assert_eq!(resolve_queue_index(QueueRole::Transfer.index(), 3), 0);
        assert_eq!(resolve_queue_index(QueueRole::Compute.index(), 3), 1);
        assert_eq!(resolve_queue_index(QueueRole::Graphics.index(), 3), 2);
    }

    #[test]
    fn roles_beyond_available_alias_the_last_queue() {
        // A single-queue family serves every role.
        assert_eq!(resolve_queue_index(QueueRole::Transfer.index(), 1), 0);
        assert_eq!(resolve_queue_index(QueueRole::Compute.index(), 1), 0);
        assert_eq!(resolve_queue_index(QueueRole::Graphics.index(), 1), 0);

        // Two queues: graphics shares the second with compute.
        assert_eq!(resolve_queue_index(QueueRole::Graphics.index(), 2), 1);
        assert_eq!(resolve_queue_index(QueueRole::Compute.index(), 2), 1);
        assert_eq!(resolve_queue_index(QueueRole::Transfer.index(), 2), 0);
    }
}
