// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Selection rules are plain functions so they can be checked without a GPU.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;
use super::image::create_image_view;
use super::VulkanDevice;

/// What the surface supports on the selected device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(device: &VulkanDevice) -> Result<Self> {
        let loader = &device.surface_loader;
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device.physical_device, device.surface)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(device.physical_device, device.surface)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device.physical_device, device.surface)
                    .context("Failed to query present modes")?,
            })
        }
    }
}

/// Prefer 8-bit BGRA sRGB, otherwise settle for the first format offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .context("No available surface formats")
}

/// `preferred` if the surface offers it, otherwise FIFO (always supported).
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    if present_modes.is_empty() {
        anyhow::bail!("No available present modes");
    }
    if present_modes.contains(&preferred) {
        Ok(preferred)
    } else {
        Ok(vk::PresentModeKHR::FIFO)
    }
}

/// The surface dictates the extent unless it reports the `u32::MAX` wildcard,
/// in which case the window's pixel size is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum so we never wait on the driver; 0 max = unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

/// Result of asking the swapchain for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Result of handing an image back for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Optimal,
    NeedsRecreate,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create a swapchain sized for a `width` x `height` window.
    ///
    /// `old` is handed to the driver on recreation so in-flight presents
    /// can finish against the previous chain.
    pub fn new(
        device: Arc<VulkanDevice>,
        preferred_present_mode: vk::PresentModeKHR,
        width: u32,
        height: u32,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let support = SwapchainSupport::query(&device)?;
        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode)?;
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = choose_image_count(&support.capabilities);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let families = device.queue_families;
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.swapchain));

        // Separate families share images concurrently instead of transferring ownership
        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swap chain")?;

        // Owned by Self straight away, so Drop cleans up if a view fails
        let mut result = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            device,
        };

        result.images = unsafe { result.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swap chain images")?;

        log::info!("Created swapchain with {} images", result.images.len());

        result.image_views.reserve(result.images.len());
        for &image in &result.images {
            let view = create_image_view(
                &result.device,
                image,
                result.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )
            .context("Failed to create swap chain image view")?;
            result.image_views.push(view);
        }

        Ok(result)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering, signalling `semaphore` once it is usable
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Acquired> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swap chain image"),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<Presented> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(Presented::Optimal),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::NeedsRecreate),
            Err(e) => Err(e).context("Failed to present swap chain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong color space
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE).unwrap(),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::FIFO
        );
        assert!(choose_present_mode(&[], vk::PresentModeKHR::FIFO).is_err());
    }

    #[test]
    fn current_extent_wins_when_defined() {
        let caps = caps((1024, 768), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn window_size_is_clamped_when_extent_is_undefined() {
        let caps = caps((u32::MAX, u32::MAX), (200, 100), (1920, 1080));
        let extent = choose_extent(&caps, 2560, 50);
        assert_eq!((extent.width, extent.height), (1920, 100));

        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);

        caps.min_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);
    }
}
