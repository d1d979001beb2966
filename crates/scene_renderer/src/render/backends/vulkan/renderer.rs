//! The renderer facade
//!
//! [`VulkanRenderer`] owns every Vulkan object and drives one frame per
//! [`VulkanRenderer::draw`] call. Field order is drop order: everything that
//! was created from the device is released before the context.

use ash::vk;
use std::path::Path;

use crate::assets::{ImageDecoder, ImageFileDecoder, ObjImporter, SceneImporter};
use crate::core::{CameraConfig, RendererConfig};
use crate::foundation::math::{look_at, vulkan_perspective, Mat4, Point3, Vec3};
use crate::render::backends::vulkan::initialization::surface::WindowSurface;
use crate::render::backends::vulkan::rendering::command_recorder::{
    DrawableModel, SceneFrame, SceneRecorder, TransformBinding,
};
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, ShaderModule};
use crate::render::backends::vulkan::resources::descriptor_set::SceneDescriptorLayouts;
use crate::render::backends::vulkan::resources::resource_pool::{GpuUploader, ResourcePool};
use crate::render::backends::vulkan::resources::transfer::TransferContext;
use crate::render::backends::vulkan::resources::uniform_buffer::{FrameUniforms, ViewProjection};
use crate::render::backends::vulkan::state::frame_sync::{FrameSynchronizer, SwapchainFrameBackend};
use crate::render::backends::vulkan::state::swapchain_manager::SwapchainManager;
use crate::render::backends::vulkan::state::sync::FrameSync;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::primitives::MeshData;

/// View-projection uniform for `camera` at the aspect ratio of `extent`
pub fn camera_view_projection(camera: &CameraConfig, extent: vk::Extent2D) -> ViewProjection {
    let aspect = extent.width as f32 / extent.height.max(1) as f32;
    let projection = vulkan_perspective(camera.fov_degrees.to_radians(), aspect, camera.near, camera.far);
    let view = look_at(
        &Point3::from(camera.eye),
        &Point3::from(camera.target),
        &Vec3::from(camera.up),
    );
    ViewProjection::new(&projection, &view)
}

/// Fail with [`VulkanError::SwapchainOutOfDate`] when the framebuffer no longer matches the swapchain
///
/// The swapchain is never recreated, so any size change is fatal.
pub fn check_extent(swapchain: vk::Extent2D, framebuffer: vk::Extent2D) -> VulkanResult<()> {
    if swapchain == framebuffer {
        Ok(())
    } else {
        log::error!(
            "Framebuffer is {}x{} but the swapchain is {}x{}; resizing is not supported",
            framebuffer.width,
            framebuffer.height,
            swapchain.width,
            swapchain.height
        );
        Err(VulkanError::SwapchainOutOfDate)
    }
}

fn uploader<'a>(
    context: &'a VulkanContext,
    command_pool: &CommandPool,
    layouts: &'a SceneDescriptorLayouts,
) -> GpuUploader<'a> {
    GpuUploader {
        context,
        transfer: TransferContext::new(context.raw_device(), command_pool.handle(), context.graphics_queue()),
        texture_layout: &layouts.texture,
    }
}

/// Frame-synchronized scene renderer
pub struct VulkanRenderer {
    frames: Vec<FrameSync>,
    synchronizer: FrameSynchronizer,
    resources: ResourcePool,
    uniforms: FrameUniforms,
    pipeline: GraphicsPipeline,
    layouts: SceneDescriptorLayouts,
    swapchain: SwapchainManager,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    view_projection: ViewProjection,
    clear_color: [f32; 4],
    importer: Box<dyn SceneImporter>,
    decoder: Box<dyn ImageDecoder>,
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Create the renderer for `window` with OBJ models and PNG/JPEG textures
    pub fn init<W: WindowSurface + ?Sized>(window: &W, config: RendererConfig) -> VulkanResult<Self> {
        Self::init_with(window, config, Box::new(ObjImporter), Box::new(ImageFileDecoder))
    }

    /// Create the renderer with custom importer and decoder collaborators
    pub fn init_with<W: WindowSurface + ?Sized>(
        window: &W,
        config: RendererConfig,
        importer: Box<dyn SceneImporter>,
        decoder: Box<dyn ImageDecoder>,
    ) -> VulkanResult<Self> {
        let mode = config.transform_mode;
        config
            .validate()
            .and_then(|()| config.shaders.validate(mode))
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let context = VulkanContext::new(window, &config.application_name, config.validation_enabled())?;
        let device = context.raw_device();

        let swapchain = SwapchainManager::new(&context, window.framebuffer_extent())?;
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let layouts = SceneDescriptorLayouts::new(device, mode)?;
        let vertex_shader = ShaderModule::from_file(device, config.shaders.vertex_path_for(mode))?;
        let fragment_shader = ShaderModule::from_file(device, &config.shaders.fragment_shader_path)?;
        let pipeline = GraphicsPipeline::new(
            device,
            swapchain.render_pass().handle(),
            extent,
            &vertex_shader,
            &fragment_shader,
            &layouts.all_layouts(),
            &layouts.push_constant_ranges(),
        )?;

        let command_pool = CommandPool::new(device, context.graphics_queue_family())?;
        let command_buffers = command_pool.allocate_command_buffers(image_count as u32)?;

        let uniforms = FrameUniforms::new(&context, &layouts, image_count, config.max_objects)?;
        let resources = ResourcePool::new(
            &uploader(&context, &command_pool, &layouts),
            config.assets.texture_directory.clone(),
            config.max_objects,
        )?;

        let frames = (0..config.max_frames_in_flight)
            .map(|_| FrameSync::new(device))
            .collect::<VulkanResult<Vec<_>>>()?;
        let synchronizer = FrameSynchronizer::new(config.max_frames_in_flight, image_count)?;

        log::info!(
            "Renderer initialized: {} swapchain image(s), {} frame(s) in flight, {:?} transforms",
            image_count,
            config.max_frames_in_flight,
            mode
        );

        Ok(Self {
            frames,
            synchronizer,
            resources,
            uniforms,
            pipeline,
            layouts,
            swapchain,
            command_buffers,
            command_pool,
            view_projection: camera_view_projection(&config.camera, extent),
            clear_color: config.clear_color,
            importer,
            decoder,
            context,
        })
    }

    /// Replace a model's world transform
    pub fn update_model(&mut self, model: usize, transform: Mat4) -> VulkanResult<()> {
        self.resources
            .model_mut(model)
            .ok_or(VulkanError::ResourceNotFound { id: model as u64 })?
            .set_transform(transform);
        Ok(())
    }

    /// Replace the camera matrices used from the next frame on
    pub fn set_camera(&mut self, view: &Mat4, projection: &Mat4) {
        self.view_projection = ViewProjection::new(projection, view);
    }

    /// Render and present one frame
    ///
    /// Every error returned here is fatal for the renderer.
    pub fn draw(&mut self) -> VulkanResult<()> {
        self.draw_frame().inspect_err(|e| log::error!("Frame failed: {}", e))
    }

    fn draw_frame(&mut self) -> VulkanResult<()> {
        let device = self.context.raw_device();
        let swapchain = self.swapchain.swapchain();
        let mut backend = SwapchainFrameBackend::new(
            device,
            swapchain.loader(),
            swapchain.handle(),
            self.context.graphics_queue(),
            self.context.present_queue(),
            &self.frames,
        );

        let ticket = self.synchronizer.begin_frame(&mut backend)?;
        let image = ticket.image_index as usize;

        let models = self.resources.models();
        self.uniforms
            .update(image, &self.view_projection, models.iter().map(DrawableModel::transform))?;

        let command_buffer = *self
            .command_buffers
            .get(image)
            .ok_or(VulkanError::ResourceNotFound { id: image as u64 })?;

        let frame = SceneFrame {
            render_pass: self.swapchain.render_pass().handle(),
            framebuffer: self.swapchain.framebuffer(image)?,
            extent: self.swapchain.extent(),
            clear_color: self.clear_color,
            pipeline: self.pipeline.handle(),
            pipeline_layout: self.pipeline.layout(),
            frame_set: self.uniforms.descriptor_set(image),
            transform: match self.uniforms.dynamic_offsets() {
                Some(offsets) => TransformBinding::DynamicUniform { offsets },
                None => TransformBinding::PushConstant,
            },
        };

        let mut recorder = CommandRecorder::new(device, command_buffer);
        SceneRecorder::record(&mut recorder, &frame, models, self.resources.textures())?;

        self.synchronizer
            .submit_and_present(&mut backend, ticket, command_buffer)
    }

    /// Load a model file; returns the model handle
    pub fn create_mesh_model(&mut self, path: impl AsRef<Path>) -> VulkanResult<usize> {
        let uploader = uploader(&self.context, &self.command_pool, &self.layouts);
        self.resources
            .load_model(&uploader, self.importer.as_ref(), self.decoder.as_ref(), path.as_ref())
    }

    /// Build a model from in-memory meshes; returns the model handle
    pub fn create_model_from_meshes(&mut self, meshes: &[MeshData]) -> VulkanResult<usize> {
        let uploader = uploader(&self.context, &self.command_pool, &self.layouts);
        self.resources.create_model_from_meshes(&uploader, meshes)
    }

    /// Load a texture from the texture directory; returns the texture handle
    pub fn create_texture(&mut self, file_name: &str) -> VulkanResult<usize> {
        let uploader = uploader(&self.context, &self.command_pool, &self.layouts);
        self.resources
            .create_texture(&uploader, self.decoder.as_ref(), file_name)
    }

    /// Fail when the window's framebuffer size differs from the swapchain extent
    pub fn check_surface_extent(&self, framebuffer: vk::Extent2D) -> VulkanResult<()> {
        check_extent(self.swapchain.extent(), framebuffer)
    }

    /// [`Self::check_surface_extent`] against the window's current framebuffer
    pub fn check_window_extent<W: WindowSurface + ?Sized>(&self, window: &W) -> VulkanResult<()> {
        self.check_surface_extent(window.framebuffer_extent())
    }

    /// Swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of loaded models
    pub fn model_count(&self) -> usize {
        self.resources.models().len()
    }

    /// Wait for the GPU to finish and release every resource
    pub fn cleanup(self) -> VulkanResult<()> {
        self.context.wait_idle()?;
        log::info!("Renderer cleaned up");
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::warn!("Device wait failed during renderer drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_extent_guard() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        assert!(check_extent(extent, extent).is_ok());

        let resized = check_extent(extent, vk::Extent2D { width: 1024, height: 600 });
        assert!(matches!(resized, Err(VulkanError::SwapchainOutOfDate)));
        assert!(resized.unwrap_err().is_fatal());

        let minimized = check_extent(extent, vk::Extent2D { width: 0, height: 0 });
        assert!(matches!(minimized, Err(VulkanError::SwapchainOutOfDate)));
    }

    #[test]
    fn test_camera_uniform_from_config() {
        let camera = CameraConfig::default();
        let vp = camera_view_projection(&camera, vk::Extent2D { width: 800, height: 600 });

        // Projection: Y flipped, x scaled by aspect.
        let f = 1.0 / (45.0_f32.to_radians() * 0.5).tan();
        assert_relative_eq!(vp.projection[1][1], -f, epsilon = 1e-5);
        assert_relative_eq!(vp.projection[0][0], f / (800.0 / 600.0), epsilon = 1e-5);

        // View: eye at z = 3 looking at the origin moves the world by -3 in z.
        assert_relative_eq!(vp.view[3][2], -3.0, epsilon = 1e-5);
    }
}
