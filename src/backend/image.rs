// Images: texture, depth buffer, views, layout transitions and mipmaps

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::path::Path;
use std::sync::Arc;
use super::buffer::{copy_buffer_to_image, Buffer};
use super::commands::one_time_submit;
use super::device::has_stencil_component;
use super::VulkanDevice;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Number of levels in a full mip chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

/// 2D image with its memory and a view over all mip levels
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Image {
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        extent: vk::Extent2D,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create image '{}'", name))?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        let mut this = Self {
            image,
            view: vk::ImageView::null(),
            format,
            extent,
            mip_levels,
            allocation: Some(allocation),
            device: device.clone(),
        };

        if let Some(allocation) = &this.allocation {
            unsafe {
                device
                    .device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Failed to bind memory for '{}'", name))?;
        }

        this.view = create_image_view(device, image, format, aspect, mip_levels)?;

        Ok(this)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
    }
}

/// Access masks, stages and aspect for one supported layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl LayoutTransition {
    pub fn between(
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        format: vk::Format,
    ) -> Result<Self> {
        let aspect = if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
            if has_stencil_component(format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let transition = match (old, new) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
                aspect,
            },
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
                Self {
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                    aspect,
                }
            }
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
                Self {
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                    aspect,
                }
            }
            _ => anyhow::bail!("Unsupported image layout transition {:?} -> {:?}", old, new),
        };

        Ok(transition)
    }
}

pub fn transition_image_layout(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    mip_levels: u32,
) -> Result<()> {
    let transition = LayoutTransition::between(old, new, format)?;

    one_time_submit(device, pool, |cmd| {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: transition.aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .build();

        unsafe {
            device.device.cmd_pipeline_barrier(
                cmd,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    })
}

/// Whether blits with linear filtering work for `format` in optimal tiling
pub fn supports_linear_blit(device: &VulkanDevice, format: vk::Format) -> bool {
    device
        .format_properties(format)
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

fn mip_barrier(
    image: vk::Image,
    level: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .old_layout(old)
        .new_layout(new)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

/// Fill levels 1.. by successive half-size blits.
///
/// Expects every level in TRANSFER_DST with level 0 populated; leaves every
/// level in SHADER_READ_ONLY.
pub fn generate_mipmaps(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    image: &Image,
) -> Result<()> {
    if !supports_linear_blit(device, image.format) {
        anyhow::bail!("Texture format {:?} does not support linear blitting", image.format);
    }

    let handle = image.image;
    let mip_levels = image.mip_levels;

    one_time_submit(device, pool, |cmd| {
        let mut mip_width = image.extent.width as i32;
        let mut mip_height = image.extent.height as i32;

        for level in 1..mip_levels {
            let to_src = mip_barrier(
                handle,
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit::builder()
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
                ])
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: next_width, y: next_height, z: 1 },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .build();

            let to_read = mip_barrier(
                handle,
                level - 1,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            );

            unsafe {
                device.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_src],
                );
                device.device.cmd_blit_image(
                    cmd,
                    handle,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
                device.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_read],
                );
            }

            mip_width = next_width;
            mip_height = next_height;
        }

        // Last level was only ever written to
        let last = mip_barrier(
            handle,
            mip_levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        );
        unsafe {
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[last],
            );
        }
        Ok(())
    })
}

/// Sampled RGBA texture
pub struct Texture {
    pub image: Image,
}

impl Texture {
    /// Decode an image file (PNG/JPEG) and upload it
    pub fn from_file(
        device: &Arc<VulkanDevice>,
        pool: vk::CommandPool,
        path: &Path,
        mipmaps: bool,
    ) -> Result<Self> {
        let pixels = image::open(path)
            .with_context(|| format!("Failed to load texture image {:?}", path))?
            .to_rgba8();
        let (width, height) = pixels.dimensions();

        log::info!("Loaded texture {}x{} from {:?}", width, height, path);

        Self::from_rgba(device, pool, width, height, pixels.as_raw(), mipmaps)
    }

    /// Generated fallback used when no texture file is configured
    pub fn checkerboard(
        device: &Arc<VulkanDevice>,
        pool: vk::CommandPool,
        mipmaps: bool,
    ) -> Result<Self> {
        const SIZE: u32 = 256;
        let pixels = checkerboard_pixels(SIZE, 32);
        Self::from_rgba(device, pool, SIZE, SIZE, &pixels, mipmaps)
    }

    pub fn from_rgba(
        device: &Arc<VulkanDevice>,
        pool: vk::CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        mipmaps: bool,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            anyhow::bail!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            );
        }

        let mut staging = Buffer::new(
            device,
            "texture staging",
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(pixels)?;

        let mip_levels = if !mipmaps {
            1
        } else if supports_linear_blit(device, TEXTURE_FORMAT) {
            mip_level_count(width, height)
        } else {
            log::warn!("{:?} does not support linear blitting, skipping mipmaps", TEXTURE_FORMAT);
            1
        };

        let image = Image::new(
            device,
            "texture",
            vk::Extent2D { width, height },
            mip_levels,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        transition_image_layout(
            device,
            pool,
            image.image,
            TEXTURE_FORMAT,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            mip_levels,
        )?;

        copy_buffer_to_image(device, pool, staging.buffer, image.image, width, height)?;

        if mip_levels > 1 {
            generate_mipmaps(device, pool, &image)?;
        } else {
            transition_image_layout(
                device,
                pool,
                image.image,
                TEXTURE_FORMAT,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                1,
            )?;
        }

        log::info!("Uploaded texture with {} mip levels", mip_levels);

        Ok(Self { image })
    }
}

/// Tightly packed RGBA8 checkerboard, `cell` pixels per square
pub fn checkerboard_pixels(size: u32, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

pub fn create_sampler(
    device: &VulkanDevice,
    mip_levels: u32,
    anisotropy: bool,
) -> Result<vk::Sampler> {
    let max_anisotropy = if anisotropy {
        device.properties.limits.max_sampler_anisotropy
    } else {
        1.0
    };

    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32);

    unsafe { device.device.create_sampler(&create_info, None) }
        .context("Failed to create texture sampler")
}

/// Depth attachment sized to the swapchain, ready for the render pass
pub fn create_depth_buffer(
    device: &Arc<VulkanDevice>,
    pool: vk::CommandPool,
    extent: vk::Extent2D,
) -> Result<Image> {
    let format = device.find_depth_format()?;

    let image = Image::new(
        device,
        "depth",
        extent,
        1,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::ImageAspectFlags::DEPTH,
    )?;

    transition_image_layout(
        device,
        pool,
        image.image,
        format,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        1,
    )?;

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_lengths() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(512, 300), 10);
        assert_eq!(mip_level_count(1000, 4000), 12);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn upload_transition() {
        let t = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TEXTURE_FORMAT,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn shader_read_transition_waits_for_the_copy() {
        let t = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            TEXTURE_FORMAT,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn depth_transition_includes_stencil_only_when_present() {
        let plain = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D32_SFLOAT,
        )
        .unwrap();
        assert_eq!(plain.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(plain.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);

        let stencil = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D24_UNORM_S8_UINT,
        )
        .unwrap();
        assert_eq!(
            stencil.aspect,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn unsupported_transition_is_rejected() {
        let result = LayoutTransition::between(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TEXTURE_FORMAT,
        );
        assert!(result.is_err());
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let pixels = checkerboard_pixels(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);

        let at = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
        assert_eq!(at(0, 0), at(1, 1));
        assert_ne!(at(0, 0), at(2, 0));
        assert_ne!(at(0, 0), at(0, 2));
        assert_eq!(at(0, 0), at(2, 2));
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }
}
