// Vulkan initialization components

pub mod context;
pub mod surface;
pub mod window;

pub use context::*;
pub use surface::*;
pub use window::*;
