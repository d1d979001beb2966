//! # Rendering System
//!
//! Backend-agnostic geometry types in [`primitives`] and the Vulkan backend
//! in [`backends::vulkan`]. Applications normally only touch
//! [`VulkanRenderer`], [`MeshData`] and the window.

// Core primitives
pub mod primitives;

/// Graphics backend implementations
pub mod backends;

#[cfg(test)]
mod tests;

pub use backends::vulkan::{VulkanError, VulkanRenderer, VulkanResult, Window};
pub use primitives::{MeshData, Vertex};
