// Buffer utilities for vertex, index, staging and uniform buffers
//
// Memory comes from the device's gpu-allocator instance. Device-local
// buffers are filled through a host-visible staging buffer.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::commands::one_time_submit;
use super::VulkanDevice;

/// GPU buffer plus the memory backing it, released on drop
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        // From here on Drop cleans up if binding fails
        let buffer = Self {
            buffer,
            size,
            allocation: Some(allocation),
            device: device.clone(),
        };

        if let Some(allocation) = &buffer.allocation {
            unsafe {
                device
                    .device
                    .bind_buffer_memory(buffer.buffer, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Failed to bind memory for '{}'", name))?;
        }

        Ok(buffer)
    }

    /// Copy `data` to the start of a host-visible buffer
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            anyhow::bail!(
                "Write of {} bytes exceeds buffer size of {} bytes",
                bytes.len(),
                self.size
            );
        }

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Create a DEVICE_LOCAL buffer holding `data`, uploaded via a staging buffer
    pub fn device_local_with_data<T: Pod>(
        device: &Arc<VulkanDevice>,
        pool: vk::CommandPool,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        if size == 0 {
            anyhow::bail!("Cannot create empty buffer '{}'", name);
        }

        let mut staging = Buffer::new(
            device,
            "staging",
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(data)?;

        let buffer = Buffer::new(
            device,
            name,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        copy_buffer(device, pool, staging.buffer, buffer.buffer, size)?;

        Ok(buffer)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

pub fn copy_buffer(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    one_time_submit(device, pool, |cmd| {
        let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(size).build();
        unsafe { device.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        Ok(())
    })
}

/// Copy tightly packed pixels into mip level 0 of an image in TRANSFER_DST layout
pub fn copy_buffer_to_image(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    one_time_submit(device, pool, |cmd| {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 })
            .build();

        unsafe {
            device.device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    })
}
