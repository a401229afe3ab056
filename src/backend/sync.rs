// Synchronization primitives
//
// Fences and semaphores for GPU-CPU and GPU-GPU sync, plus the bookkeeping
// that keeps frames in flight from touching a swapchain image still in use.

use ash::vk;
use anyhow::{Context, Result};
use std::sync::Arc;
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each frame returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        // Null handles are ignored by the destroy calls if creation stops halfway
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device: device.clone(),
        };

        unsafe {
            sync.image_available = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create image-available semaphore")?;
            sync.render_finished = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create render-finished semaphore")?;
            sync.in_flight_fence = device
                .device
                .create_fence(&fence_info, None)
                .context("Failed to create in-flight fence")?;
        }

        Ok(sync)
    }

    pub fn create_frames(device: &Arc<VulkanDevice>, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::new(device)).collect()
    }

    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
        }
        .context("Failed to wait for in-flight fence")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Which frame fence last submitted work against each swapchain image.
///
/// The fences are borrowed from `FrameSync`; this table never destroys them.
#[derive(Debug, Default)]
pub struct ImagesInFlight {
    fences: Vec<vk::Fence>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Forget all owners, e.g. after the swapchain was rebuilt
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, vk::Fence::null());
    }

    /// Record `fence` as the owner of `image`.
    ///
    /// Returns the previous owner, which must be waited on before the image
    /// is reused, or `None` if the image is free (or already owned by `fence`).
    pub fn claim(&mut self, image: usize, fence: vk::Fence) -> Option<vk::Fence> {
        let slot = self.fences.get_mut(image)?;
        let previous = std::mem::replace(slot, fence);
        (previous != vk::Fence::null() && previous != fence).then_some(previous)
    }
}

/// Round-robin index over the frames in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    current: usize,
    count: usize,
}

impl FrameCursor {
    pub fn new(count: usize) -> Self {
        Self {
            current: 0,
            count: count.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn free_image_needs_no_wait() {
        let mut images = ImagesInFlight::new(3);
        assert_eq!(images.claim(0, fence(1)), None);
        assert_eq!(images.claim(1, fence(2)), None);
    }

    #[test]
    fn reclaiming_returns_previous_owner() {
        let mut images = ImagesInFlight::new(2);
        images.claim(1, fence(1));
        assert_eq!(images.claim(1, fence(2)), Some(fence(1)));
        assert_eq!(images.claim(1, fence(1)), Some(fence(2)));
    }

    #[test]
    fn same_fence_does_not_wait_on_itself() {
        let mut images = ImagesInFlight::new(2);
        images.claim(0, fence(7));
        assert_eq!(images.claim(0, fence(7)), None);
    }

    #[test]
    fn reset_forgets_owners_and_resizes() {
        let mut images = ImagesInFlight::new(2);
        images.claim(0, fence(1));
        images.reset(4);
        assert_eq!(images.claim(0, fence(2)), None);
        assert_eq!(images.claim(3, fence(2)), None);
        // Out of range after the resize
        assert_eq!(images.claim(4, fence(2)), None);
    }

    #[test]
    fn cursor_wraps_around() {
        let mut cursor = FrameCursor::new(2);
        assert_eq!(cursor.current(), 0);
        cursor.advance();
        assert_eq!(cursor.current(), 1);
        cursor.advance();
        assert_eq!(cursor.current(), 0);

        let mut single = FrameCursor::new(0);
        single.advance();
        assert_eq!(single.current(), 0);
    }
}
