//! Vulkan resource management
//!
//! Buffers, images, textures, uniform buffers, descriptors, and the
//! resource pool that owns every model.

/// Buffers and memory type selection
pub mod buffer;

/// Images, views and layout transitions
pub mod image;

/// Staging uploads through one-shot command buffers
pub mod transfer;

/// Descriptor set layouts, pools and writes
pub mod descriptor_set;

/// Textures and the sampler they share
pub mod texture;

/// Per-frame camera and model uniforms
pub mod uniform_buffer;

/// Meshes, models and model loading
pub mod resource_pool;

pub use buffer::{find_memory_type, Buffer};
pub use descriptor_set::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter, SceneDescriptorLayouts,
};
pub use image::{Image, ImageDesc, LayoutTransition};
pub use resource_pool::{GpuUploader, Mesh, Model, ResourcePool, TextureNameCache};
pub use texture::{Texture, TextureArena, TextureSampler, DEFAULT_TEXTURE};
pub use transfer::{create_device_local_buffer, upload_texture_image, TransferContext};
pub use uniform_buffer::{FrameUniforms, ModelUniform, ViewProjection};
