// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface
// - Physical device selection (must present to the surface, prefer discrete GPU)
// - Logical device + graphics/present queues
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;
use winit::window::Window;
use super::guard::CleanupGuard;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Queue family indices discovered on a physical device.
///
/// Graphics and present support may live in the same family or in two
/// different ones; both must be found for the device to be usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan queue families. A family that can do both is taken immediately,
    /// otherwise the first graphics family and the first present family win.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let index = i as u32;
            let graphics = family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(index)?;

            if graphics && present {
                return Ok(Self {
                    graphics: Some(index),
                    present: Some(index),
                });
            }
            if graphics && indices.graphics.is_none() {
                indices.graphics = Some(index);
            }
            if present && indices.present.is_none() {
                indices.present = Some(index);
            }
        }

        Ok(indices)
    }

    /// Resolved families, if complete.
    pub fn families(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Complete set of queue families used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, one queue gets created per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create the instance, surface and device for `window`.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Khronos validation layer + debug messenger
    /// * `window` - Window the surface is created for
    pub fn new(app_name: &str, enable_validation: bool, window: &Window) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if enable_validation {
            check_validation_layer_support(&entry)?;
        }

        let instance = Self::create_instance(&entry, app_name, enable_validation, window)?;
        let instance_guard = CleanupGuard::new({
            let instance = instance.clone();
            move || unsafe { instance.destroy_instance(None) }
        });

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };
        let messenger_guard = CleanupGuard::new({
            let debug_utils = debug_utils.clone();
            move || {
                if let Some((debug_utils, messenger)) = debug_utils {
                    unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
                }
            }
        });

        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;
        let surface_guard = CleanupGuard::new({
            let surface_loader = surface_loader.clone();
            move || unsafe { surface_loader.destroy_surface(surface, None) }
        });

        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, queue_families)?;
        let device_guard = CleanupGuard::new({
            let device = device.clone();
            move || unsafe { device.destroy_device(None) }
        });

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics={} present={}",
            queue_families.graphics,
            queue_families.present
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        // From here on Drop owns every handle
        device_guard.disarm();
        surface_guard.disarm();
        messenger_guard.disarm();
        instance_guard.disarm();

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        window: &Window,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Window system extensions for this platform
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(window.raw_display_handle())
                .context("Failed to query window system extensions")?
                .to_vec();

        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        if log::log_enabled!(log::Level::Debug) {
            let available = entry.enumerate_instance_extension_properties(None)?;
            log::debug!("Available instance extensions:");
            for ext in &available {
                log::debug!("\t{}", unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_string_lossy());
            }
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so instance creation/destruction itself is validated too
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);
        let create_info = debug_messenger_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("Failed to find GPUs with Vulkan support");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            let Some(families) = Self::check_device(instance, surface_loader, surface, device)? else {
                log::debug!("Skipping unsuitable GPU: {}", name);
                continue;
            };

            let score = device_type_score(props.device_type);
            log::debug!("Suitable GPU: {} (score {})", name, score);

            if score > best_score {
                best_score = score;
                best_device = Some((device, families));
            }
        }

        best_device.context("Failed to find a suitable GPU")
    }

    /// Queue families of `device` if it can run this renderer.
    fn check_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilies>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let indices = QueueFamilyIndices::find(&queue_families, |index| {
            unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                .context("Failed to query surface support")
        })?;

        let Some(families) = indices.families() else {
            return Ok(None);
        };

        let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
        let available_names: Vec<&CStr> = available
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();
        let missing = missing_names(&available_names, &[khr::Swapchain::name()]);
        if !missing.is_empty() {
            log::debug!("Missing device extensions: {:?}", missing);
            return Ok(None);
        }

        // Only worth asking once the swapchain extension is known to exist
        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }?;
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }?;
        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);
        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        // Same handle twice when the families coincide
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    /// Lock the GPU memory allocator
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock()
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// First candidate supporting `features` with the given tiling
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        select_format(candidates, tiling, features, |format| self.format_properties(format))
            .context("Failed to find supported image format")
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle failed")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            // Allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Pure format selection, `props_of` answers the per-format capability query.
pub fn select_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    props_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = props_of(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// Names from `required` that are absent in `available`.
fn missing_names<'a>(available: &[&CStr], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

fn check_validation_layer_support(entry: &Entry) -> Result<()> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?;
    let names: Vec<&CStr> = layers
        .iter()
        .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
        .collect();

    if !missing_names(&names, &[VALIDATION_LAYER]).is_empty() {
        anyhow::bail!("Validation layers requested, but not available");
    }
    Ok(())
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::trace!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // Family 0 graphics only, 1 present only, 2 both
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i != 0)).unwrap();
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
        assert!(indices.families().unwrap().is_shared());
    }

    #[test]
    fn split_families_are_both_kept() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap();
        let resolved = indices.families().unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(resolved.unique(), vec![0, 1]);
        assert!(!resolved.is_shared());
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();
        assert!(indices.families().is_none());
    }

    #[test]
    fn empty_queue_family_is_not_graphics() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics, Some(1));
    }

    #[test]
    fn surface_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| anyhow::bail!("lost surface"));
        assert!(result.is_err());
    }

    #[test]
    fn shared_family_has_one_unique_entry() {
        let families = QueueFamilies { graphics: 3, present: 3 };
        assert_eq!(families.unique(), vec![3]);
    }

    #[test]
    fn discrete_gpu_scores_highest() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_score(vk::PhysicalDeviceType::CPU)
        );
    }

    #[test]
    fn missing_names_reports_only_absent_entries() {
        let available = [c"VK_KHR_swapchain", c"VK_KHR_maintenance1"];
        assert!(missing_names(&available, &[c"VK_KHR_swapchain"]).is_empty());
        assert_eq!(
            missing_names(&available, &[c"VK_KHR_swapchain", c"VK_EXT_mesh_shader"]),
            vec![c"VK_EXT_mesh_shader"]
        );
    }

    #[test]
    fn depth_format_follows_candidate_order() {
        let props_of = |format: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if format == vk::Format::D32_SFLOAT {
                vk::FormatFeatureFlags::empty()
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            },
            ..Default::default()
        };

        let chosen = select_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            props_of,
        );
        assert_eq!(chosen, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn tiling_selects_the_matching_feature_set() {
        let props_of = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert_eq!(
            select_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::LINEAR, features, props_of),
            Some(vk::Format::D32_SFLOAT)
        );
        assert_eq!(
            select_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, features, props_of),
            None
        );
    }

    #[test]
    fn stencil_formats() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
