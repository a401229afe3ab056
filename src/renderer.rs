// Renderer - owns the Vulkan handle graph and drives the frame loop
//
// Three lifetimes:
//   SceneResources      created once (texture, geometry, pools, layout)
//   SwapchainResources  rebuilt as a unit whenever the surface changes
//   FrameSync           one set per frame in flight
//
// Fields are declared in reverse creation order so Drop tears down correctly.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;
use crate::backend::commands::{allocate_command_buffers, create_command_pool};
use crate::backend::descriptor::{
    create_descriptor_pool, create_descriptor_set_layout, create_descriptor_sets,
};
use crate::backend::image::{create_depth_buffer, create_sampler};
use crate::backend::pipeline::{create_framebuffers, create_graphics_pipeline, create_render_pass};
use crate::backend::shader::ShaderModule;
use crate::backend::swapchain::{Acquired, Presented};
use crate::backend::{
    Buffer, FrameCursor, FrameSync, Image, ImagesInFlight, Swapchain, Texture, VulkanDevice,
};
use crate::config::Config;
use crate::scene::{Camera, Mesh, UniformBufferObject};

/// Resources that survive swapchain recreation
struct SceneResources {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    texture: Texture,
    sampler: vk::Sampler,
    descriptor_set_layout: vk::DescriptorSetLayout,
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl SceneResources {
    fn new(device: &Arc<VulkanDevice>, config: &Config) -> Result<Self> {
        let command_pool = create_command_pool(device, device.queue_families.graphics)?;

        match Self::load(device, config, command_pool) {
            Ok(scene) => Ok(scene),
            Err(e) => {
                unsafe { device.device.destroy_command_pool(command_pool, None) };
                Err(e)
            }
        }
    }

    fn load(
        device: &Arc<VulkanDevice>,
        config: &Config,
        command_pool: vk::CommandPool,
    ) -> Result<Self> {
        let mipmaps = config.graphics.mipmaps;
        let texture = match &config.assets.texture_path {
            Some(path) => Texture::from_file(device, command_pool, path, mipmaps)?,
            None => {
                log::info!("No texture configured, using checkerboard");
                Texture::checkerboard(device, command_pool, mipmaps)?
            }
        };

        let mesh = match &config.assets.model_path {
            Some(path) => Mesh::load_obj(path)?,
            None => {
                log::info!("No model configured, using built-in quads");
                Mesh::quads()
            }
        };

        let vertex_buffer = Buffer::device_local_with_data(
            device,
            command_pool,
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &mesh.vertices,
        )?;
        let index_buffer = Buffer::device_local_with_data(
            device,
            command_pool,
            "index buffer",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &mesh.indices,
        )?;

        let anisotropy = config.graphics.anisotropy;
        let sampler = create_sampler(device, texture.image.mip_levels, anisotropy)?;

        let descriptor_set_layout = match create_descriptor_set_layout(device) {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.device.destroy_sampler(sampler, None) };
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            texture,
            sampler,
            descriptor_set_layout,
            command_pool,
            device: device.clone(),
        })
    }
}

impl Drop for SceneResources {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Everything whose size or count follows the swapchain
struct SwapchainResources {
    command_buffers: Vec<vk::CommandBuffer>,
    descriptor_pool: vk::DescriptorPool,
    uniform_buffers: Vec<Buffer>,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    depth: Image,
    swapchain: Swapchain,
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl SwapchainResources {
    fn new(
        device: &Arc<VulkanDevice>,
        config: &Config,
        scene: &SceneResources,
        width: u32,
        height: u32,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let swapchain =
            Swapchain::new(device.clone(), config.present_mode(), width, height, old)?;
        let depth = create_depth_buffer(device, scene.command_pool, swapchain.extent)?;

        // Handles start null; Drop skips them if a later step fails
        let mut resources = Self {
            command_buffers: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            uniform_buffers: Vec::new(),
            framebuffers: Vec::new(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            depth,
            swapchain,
            command_pool: scene.command_pool,
            device: device.clone(),
        };

        let extent = resources.swapchain.extent;
        let image_count = resources.swapchain.image_count();

        resources.render_pass =
            create_render_pass(device, resources.swapchain.format, resources.depth.format)?;

        let vert = ShaderModule::from_file(device, &config.assets.vertex_shader)?;
        let frag = ShaderModule::from_file(device, &config.assets.fragment_shader)?;
        let (pipeline, pipeline_layout) = create_graphics_pipeline(
            device,
            resources.render_pass,
            extent,
            scene.descriptor_set_layout,
            &vert,
            &frag,
        )?;
        resources.pipeline = pipeline;
        resources.pipeline_layout = pipeline_layout;

        resources.framebuffers = create_framebuffers(
            device,
            &resources.swapchain.image_views,
            resources.depth.view,
            resources.render_pass,
            extent,
        )?;

        let ubo_size = size_of::<UniformBufferObject>() as vk::DeviceSize;
        resources.uniform_buffers = (0..image_count)
            .map(|i| {
                Buffer::new(
                    device,
                    &format!("uniform buffer {}", i),
                    ubo_size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                )
            })
            .collect::<Result<_>>()?;

        resources.descriptor_pool = create_descriptor_pool(device, image_count as u32)?;
        let uniforms: Vec<_> = resources
            .uniform_buffers
            .iter()
            .map(|b| (b.buffer, ubo_size))
            .collect();
        let descriptor_sets = create_descriptor_sets(
            device,
            resources.descriptor_pool,
            scene.descriptor_set_layout,
            &uniforms,
            scene.texture.image.view,
            scene.sampler,
        )?;

        resources.command_buffers =
            allocate_command_buffers(device, scene.command_pool, image_count as u32)?;
        resources.record(scene, &descriptor_sets, config.graphics.clear_color)?;

        Ok(resources)
    }

    /// Record one draw per swapchain image; replayed every frame until recreation
    fn record(
        &self,
        scene: &SceneResources,
        descriptor_sets: &[vk::DescriptorSet],
        clear_color: [f32; 4],
    ) -> Result<()> {
        let device = &self.device.device;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        for ((&cmd, &framebuffer), &set) in self
            .command_buffers
            .iter()
            .zip(&self.framebuffers)
            .zip(descriptor_sets)
        {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.swapchain.extent,
                })
                .clear_values(&clear_values);

            unsafe {
                device
                    .begin_command_buffer(cmd, &begin_info)
                    .context("Failed to begin recording command buffer")?;

                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
                device.cmd_bind_vertex_buffers(cmd, 0, &[scene.vertex_buffer.buffer], &[0]);
                device.cmd_bind_index_buffer(
                    cmd,
                    scene.index_buffer.buffer,
                    0,
                    vk::IndexType::UINT32,
                );
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout,
                    0,
                    &[set],
                    &[],
                );
                device.cmd_draw_indexed(cmd, scene.index_count, 1, 0, 0, 0);
                device.cmd_end_render_pass(cmd);

                device
                    .end_command_buffer(cmd)
                    .context("Failed to record command buffer")?;
            }
        }

        Ok(())
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
            // Also frees the descriptor sets
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
        // uniform buffers, depth and swapchain drop after this, in field order
    }
}

pub struct Renderer {
    frames: Vec<FrameSync>,
    resources: Option<SwapchainResources>,
    scene: SceneResources,
    images_in_flight: ImagesInFlight,
    cursor: FrameCursor,
    camera: Camera,
    config: Config,
    start: Instant,
    resized: bool,
    minimized: bool,
    device: Arc<VulkanDevice>,
    // The surface must be gone before the window
    window: Arc<Window>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let device = VulkanDevice::new(
            &config.window.title,
            config.debug.validation_enabled(),
            &window,
        )?;

        let scene = SceneResources::new(&device, config)?;

        let size = window.inner_size();
        let minimized = size.width == 0 || size.height == 0;
        let resources = if minimized {
            None
        } else {
            Some(SwapchainResources::new(
                &device,
                config,
                &scene,
                size.width,
                size.height,
                None,
            )?)
        };
        let image_count = resources.as_ref().map_or(0, |r| r.swapchain.image_count());

        let frames_in_flight = config.graphics.max_frames_in_flight;
        let frames = FrameSync::create_frames(&device, frames_in_flight)?;

        log::info!(
            "Renderer ready: {} swapchain images, {} frames in flight",
            image_count,
            frames_in_flight
        );

        Ok(Self {
            frames,
            resources,
            scene,
            images_in_flight: ImagesInFlight::new(image_count),
            cursor: FrameCursor::new(frames_in_flight),
            camera: Camera::from(&config.camera),
            config: config.clone(),
            start: Instant::now(),
            resized: false,
            minimized,
            device,
            window,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Note a new window size; the swapchain is rebuilt on the next frame
    pub fn resized(&mut self, width: u32, height: u32) {
        self.resized = true;
        self.minimized = width == 0 || height == 0;
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Render and present one frame.
    ///
    /// Returns `Ok(false)` when nothing was presented (minimized window or
    /// a swapchain that had to be rebuilt first).
    pub fn draw_frame(&mut self) -> Result<bool> {
        if self.minimized {
            return Ok(false);
        }
        if self.resources.is_none() {
            self.recreate_swapchain()?;
            if self.resources.is_none() {
                return Ok(false);
            }
        }

        let frame = &self.frames[self.cursor.current()];
        frame.wait()?;
        let image_available = frame.image_available;
        let render_finished = frame.render_finished;
        let fence = frame.in_flight_fence;

        let Some(resources) = self.resources.as_mut() else {
            return Ok(false);
        };

        let (image_index, suboptimal) =
            match resources.swapchain.acquire_next_image(image_available)? {
                Acquired::Image { index, suboptimal } => (index, suboptimal),
                Acquired::OutOfDate => {
                    log::debug!("Swapchain out of date on acquire");
                    self.recreate_swapchain()?;
                    return Ok(false);
                }
            };
        let image = image_index as usize;

        let ubo = self
            .camera
            .uniforms(self.start.elapsed().as_secs_f32(), resources.swapchain.extent);
        resources.uniform_buffers[image].write(&[ubo])?;

        // An older frame may still be rendering into this image
        if let Some(previous) = self.images_in_flight.claim(image, fence) {
            unsafe { self.device.device.wait_for_fences(&[previous], true, u64::MAX) }
                .context("Failed to wait for image fence")?;
        }

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [resources.command_buffers[image]];
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.frames[self.cursor.current()].reset()?;
        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], fence)
        }
        .context("Failed to submit draw command buffer")?;

        let presented =
            resources
                .swapchain
                .present(self.device.present_queue, image_index, &signal_semaphores)?;

        if presented == Presented::NeedsRecreate || suboptimal || self.resized {
            self.resized = false;
            self.recreate_swapchain()?;
        }

        self.cursor.advance();
        Ok(true)
    }

    /// Rebuild everything that depends on the swapchain, reusing the old handle
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;

        self.device.wait_idle()?;

        let old = self.resources.take();
        let resources = SwapchainResources::new(
            &self.device,
            &self.config,
            &self.scene,
            size.width,
            size.height,
            old.as_ref().map(|r| &r.swapchain),
        )?;
        drop(old);

        self.images_in_flight.reset(resources.swapchain.image_count());
        log::info!(
            "Swapchain recreated at {}x{}",
            resources.swapchain.extent.width,
            resources.swapchain.extent.height
        );
        self.resources = Some(resources);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {:#}", e);
        }
        // Per-frame and per-swapchain objects first; the rest drop in field order
        self.frames.clear();
        self.resources = None;
    }
}
