// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash. Handles that own GPU memory or
// per-swapchain state clean up in Drop; the rest are plain functions.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod guard;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use device::VulkanDevice;
pub use self::image::{Image, Texture};
pub use swapchain::Swapchain;
pub use sync::{FrameCursor, FrameSync, ImagesInFlight};
