// Vulkan state management

pub mod frame_sync;
pub mod framebuffer;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use frame_sync::*;
pub use framebuffer::*;
pub use swapchain::*;
pub use swapchain_manager::*;
pub use sync::*;
