// Command pools and buffers
//
// Per-image draw buffers are pre-recorded by the renderer; uploads and
// layout transitions go through `one_time_submit`.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

pub fn create_command_pool(device: &VulkanDevice, queue_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(queue_family);

    unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")
}

pub fn allocate_command_buffers(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")
}

/// Record with `record`, submit to the graphics queue and block until done.
///
/// The command buffer is freed whether or not recording succeeded.
pub fn one_time_submit<F>(device: &VulkanDevice, pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let cmd = allocate_command_buffers(device, pool, 1)?[0];

    let result = (|| -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.device.begin_command_buffer(cmd, &begin_info) }
            .context("Failed to begin one-time command buffer")?;

        record(cmd)?;

        unsafe { device.device.end_command_buffer(cmd) }
            .context("Failed to record one-time command buffer")?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit one-time command buffer")?;
            device
                .device
                .queue_wait_idle(device.graphics_queue)
                .context("vkQueueWaitIdle failed")?;
        }
        Ok(())
    })();

    unsafe { device.device.free_command_buffers(pool, &[cmd]) };

    result
}
