//! Swapchain image set
//!
//! Owns the swapchain, its color views, the single depth buffer, the render
//! pass and one framebuffer per swapchain image. They are created together
//! and dropped together; nothing in the group is rebuilt on its own.

use ash::vk;

use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::state::framebuffer::{
    choose_depth_format, DepthBuffer, Framebuffer, DEPTH_FORMAT_CANDIDATES,
};
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Swapchain plus everything sized or formatted after it
pub struct SwapchainManager {
    // Drop order: framebuffers reference the views, depth buffer and render pass.
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
}

impl SwapchainManager {
    /// Create the swapchain for `framebuffer_extent` and build the image set
    pub fn new(context: &VulkanContext, framebuffer_extent: vk::Extent2D) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(context, framebuffer_extent)?;
        let extent = swapchain.extent();

        let instance = context.instance();
        let physical = context.physical_device().device;
        let depth_format = choose_depth_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| unsafe { instance.get_physical_device_format_properties(physical, format) },
        )?;

        let depth_buffer = DepthBuffer::new(context, extent, depth_format)?;
        let render_pass = RenderPass::new_forward_pass(context.raw_device(), swapchain.format().format, depth_format)?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    context.raw_device(),
                    render_pass.handle(),
                    &[view, depth_buffer.view()],
                    extent,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Swapchain image set ready: {} framebuffer(s), depth {:?}",
            framebuffers.len(),
            depth_format
        );
        Ok(Self {
            framebuffers,
            render_pass,
            depth_buffer,
            swapchain,
        })
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// The forward render pass
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Framebuffer for swapchain image `image_index`
    pub fn framebuffer(&self, image_index: usize) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index)
            .map(Framebuffer::handle)
            .ok_or(VulkanError::ResourceNotFound {
                id: image_index as u64,
            })
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Depth format in use
    pub fn depth_format(&self) -> vk::Format {
        self.depth_buffer.format()
    }
}
