// Descriptor layout, pool and sets
//
// Binding 0: uniform buffer (vertex stage)
// Binding 1: combined image sampler (fragment stage)

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(SAMPLER_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ]
}

pub fn create_descriptor_set_layout(device: &VulkanDevice) -> Result<vk::DescriptorSetLayout> {
    let bindings = layout_bindings();
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
        .context("Failed to create descriptor set layout")
}

/// Pool sized for exactly `set_count` sets of the layout above
pub fn pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count,
        },
    ]
}

pub fn create_descriptor_pool(device: &VulkanDevice, set_count: u32) -> Result<vk::DescriptorPool> {
    let sizes = pool_sizes(set_count);
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&sizes)
        .max_sets(set_count);

    unsafe { device.device.create_descriptor_pool(&pool_info, None) }
        .context("Failed to create descriptor pool")
}

/// Allocate one set per uniform buffer and point each at its buffer and the texture
pub fn create_descriptor_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform_buffers: &[(vk::Buffer, vk::DeviceSize)],
    texture_view: vk::ImageView,
    sampler: vk::Sampler,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; uniform_buffers.len()];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
        .context("Failed to allocate descriptor sets")?;

    for (&set, &(buffer, range)) in sets.iter().zip(uniform_buffers) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: texture_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(UNIFORM_BINDING)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(SAMPLER_BINDING)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
        ];

        unsafe { device.device.update_descriptor_sets(&writes, &[]) };
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_match_shader_interface() {
        let [ubo, sampler] = layout_bindings();
        assert_eq!(ubo.binding, 0);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(sampler.binding, 1);
        assert_eq!(sampler.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_holds_one_of_each_per_set() {
        let sizes = pool_sizes(3);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
        assert_ne!(sizes[0].ty, sizes[1].ty);
    }
}
