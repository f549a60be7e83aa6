//! Vulkan instance creation and adapter selection.

use crate::capabilities::AdapterInfo;
use crate::context::ContextConfig;
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

/// Validation layers to enable when validation is requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Verify the requested layers are present before creating the instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub(crate) unsafe fn check_layers(entry: &ash::Entry, layers: &[&CStr]) -> Result<()> {
    let available = unsafe { entry.enumerate_instance_layer_properties()? };
    for layer in layers {
        let found = available.iter().any(|props| {
            let name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
            name == *layer
        });
        if !found {
            return Err(GpuError::LayerNotSupported(
                layer.to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(())
}

/// Verify the required instance extensions are present.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn check_instance_extensions(entry: &ash::Entry, extensions: &[*const i8]) -> Result<()> {
    let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
    for &extension in extensions {
        let requested = unsafe { CStr::from_ptr(extension) };
        let found = available.iter().any(|props| {
            let name = unsafe { CStr::from_ptr(props.extension_name.as_ptr()) };
            name == requested
        });
        if !found {
            return Err(GpuError::ExtensionNotSupported(
                requested.to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(())
}

/// Create a Vulkan instance with the window system's required extensions.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and the display handle must
/// belong to a live window system connection.
pub(crate) unsafe fn create_instance(
    entry: &ash::Entry,
    config: &ContextConfig,
    display_handle: RawDisplayHandle,
) -> Result<ash::Instance> {
    let app_name = CString::new(config.app_name.as_str())
        .map_err(|_| GpuError::Other("application name contains a NUL byte".into()))?;
    let engine_name = CString::new(config.engine_name.as_str())
        .map_err(|_| GpuError::Other("engine name contains a NUL byte".into()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(config.app_version)
        .engine_name(&engine_name)
        .engine_version(config.engine_version)
        .api_version(config.api_version);

    let layers = if config.validation {
        validation_layers()
    } else {
        vec![]
    };
    unsafe { check_layers(entry, &layers)? };
    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    let extension_names = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
    unsafe { check_instance_extensions(entry, extension_names)? };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(extension_names);

    let instance = unsafe {
        entry
            .create_instance(&create_info, None)
            .map_err(|e| GpuError::native("vkCreateInstance", &config.app_name, e))?
    };

    Ok(instance)
}

/// Fixed score weights for adapter device types.
///
/// Discrete beats integrated beats CPU-emulated; the maximum 2D image
/// dimension breaks ties between adapters of the same type.
fn device_type_weight(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Score an adapter that already passed suitability filtering.
pub(crate) fn score_adapter(device_type: vk::PhysicalDeviceType, max_image_dimension_2d: u32) -> u32 {
    1 + device_type_weight(device_type) + max_image_dimension_2d
}

/// Returns `true` when every feature enabled in `requested` is also
/// enabled in `supported`.
pub(crate) fn supports_requested_features(
    supported: &vk::PhysicalDeviceFeatures,
    requested: &vk::PhysicalDeviceFeatures,
) -> bool {
    // VkPhysicalDeviceFeatures is a flat struct of VkBool32 fields, so a
    // field-wise comparison can walk it as one.
    let count = std::mem::size_of::<vk::PhysicalDeviceFeatures>() / std::mem::size_of::<vk::Bool32>();
    let supported = unsafe {
        std::slice::from_raw_parts(std::ptr::from_ref(supported).cast::<vk::Bool32>(), count)
    };
    let requested = unsafe {
        std::slice::from_raw_parts(std::ptr::from_ref(requested).cast::<vk::Bool32>(), count)
    };

    requested
        .iter()
        .zip(supported)
        .all(|(&want, &have)| want == vk::FALSE || have == vk::TRUE)
}

/// The adapter chosen by selection, with the queue family every role
/// draws from.
pub(crate) struct AdapterPick {
    pub physical_device: vk::PhysicalDevice,
    pub info: AdapterInfo,
    pub queue_family: u32,
    pub queue_count: u32,
}

/// Select the best adapter able to present to the given surface.
///
/// Adapters are discarded when they lack a queue family supporting
/// graphics + compute + presentation, miss a requested feature or device
/// extension, or report no surface formats / present modes. Survivors are
/// scored by device type and maximum image dimension.
///
/// # Safety
/// Instance, surface loader and surface must be valid.
pub(crate) unsafe fn select_adapter(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    config: &ContextConfig,
) -> Result<AdapterPick> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };

    let mut best: Option<AdapterPick> = None;
    let mut best_score = 0u32;

    for physical_device in physical_devices {
        let info = unsafe { AdapterInfo::query(instance, physical_device) };

        let Some((family, queue_count)) =
            (unsafe { find_presentable_queue_family(instance, surface_loader, surface, physical_device)? })
        else {
            tracing::debug!(
                "{}: no graphics+compute+present queue family, skipping",
                info.device_name
            );
            continue;
        };

        let supported_features =
            unsafe { instance.get_physical_device_features(physical_device) };
        if !supports_requested_features(&supported_features, &config.features) {
            tracing::debug!("{}: missing requested device features, skipping", info.device_name);
            continue;
        }

        let extension_names: Vec<String> = std::iter::once(ash::khr::swapchain::NAME)
            .chain(config.device_extensions.iter().copied())
            .map(|e| e.to_string_lossy().into_owned())
            .collect();
        if !info.supports_extensions(extension_names.iter().map(String::as_str)) {
            tracing::debug!("{}: missing requested device extensions, skipping", info.device_name);
            continue;
        }

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };
        if formats.is_empty() || present_modes.is_empty() {
            tracing::debug!("{}: no surface formats or present modes, skipping", info.device_name);
            continue;
        }

        let score = score_adapter(info.device_type, info.max_image_dimension_2d);
        if score > best_score {
            best_score = score;
            best = Some(AdapterPick {
                physical_device,
                info,
                queue_family: family,
                queue_count,
            });
        }
    }

    best.ok_or(GpuError::NoSuitableAdapter)
}

/// Find a queue family supporting graphics, compute, and presentation to
/// the target surface. Returns the family index and its queue count.
///
/// # Safety
/// Instance, surface loader and surface must be valid.
unsafe fn find_presentable_queue_family(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<Option<(u32, u32)>> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        if !family.queue_flags.contains(flags) {
            continue;
        }
        let present_support = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, index, surface)?
        };
        if present_support {
            return Ok(Some((index, family.queue_count)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_outscores_integrated() {
        // Equally capable otherwise: same maximum image dimension.
        let discrete = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        let integrated = score_adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        let cpu = score_adapter(vk::PhysicalDeviceType::CPU, 16384);

        assert!(discrete > integrated);
        assert!(integrated > cpu);
    }

    #[test]
    fn image_dimension_breaks_ties() {
        let small = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let large = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        assert!(large > small);
    }

    #[test]
    fn feature_subset_check() {
        let mut supported = vk::PhysicalDeviceFeatures::default();
        supported.geometry_shader = vk::TRUE;
        supported.sampler_anisotropy = vk::TRUE;

        let mut requested = vk::PhysicalDeviceFeatures::default();
        requested.sampler_anisotropy = vk::TRUE;
        assert!(supports_requested_features(&supported, &requested));

        requested.tessellation_shader = vk::TRUE;
        assert!(!supports_requested_features(&supported, &requested));
    }

    #[test]
    fn empty_request_is_always_satisfied() {
        let supported = vk::PhysicalDeviceFeatures::default();
        let requested = vk::PhysicalDeviceFeatures::default();
        assert!(supports_requested_features(&supported, &requested));
    }
}
