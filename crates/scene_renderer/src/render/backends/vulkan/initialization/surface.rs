//! Window surface collaborator
//!
//! The renderer needs three things from a window: the instance extensions
//! required to present to it, a `VkSurfaceKHR`, and the current framebuffer
//! size in pixels. Anything implementing [`WindowSurface`] can host a
//! renderer.

use ash::vk;

use crate::render::backends::vulkan::VulkanResult;

/// Native window able to host a Vulkan surface
pub trait WindowSurface {
    /// Instance extensions needed to create and present to the surface
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create the presentation surface for `instance`
    fn create_surface(&self, instance: &ash::Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
}
