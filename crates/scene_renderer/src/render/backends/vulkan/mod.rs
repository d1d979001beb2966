//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules,
//! tied together by [`VulkanRenderer`].

/// Vulkan initialization types (context, surface, window)
pub mod initialization;

/// Vulkan resource management (buffers, images, textures, descriptors, models)
pub mod resources;

/// Vulkan rendering operations (shaders, pipeline, render pass, commands)
pub mod rendering;

/// Swapchain and frame synchronization state
pub mod state;

/// Main Vulkan renderer implementation
pub mod renderer;

// Re-export main renderer
pub use renderer::VulkanRenderer;

// Re-export core initialization types
pub use initialization::context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};
pub use initialization::surface::WindowSurface;
pub use initialization::window::{Window, WindowError};

// Re-export resource types
pub use resources::buffer::Buffer;
pub use resources::resource_pool::{Mesh, Model, ResourcePool};
pub use resources::texture::{Texture, DEFAULT_TEXTURE};

// Re-export rendering types
pub use rendering::command_recorder::{DrawCommandSink, SceneRecorder};
pub use rendering::commands::{CommandPool, CommandRecorder};
pub use rendering::shader::{GraphicsPipeline, ShaderModule};

// Re-export state types
pub use state::frame_sync::{FrameBackend, FrameSynchronizer, FrameTicket};
pub use state::swapchain_manager::SwapchainManager;
pub use state::sync::{Fence, FrameSync, Semaphore};
