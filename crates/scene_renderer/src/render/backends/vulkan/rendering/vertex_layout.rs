//! Vulkan vertex input description for [`Vertex`]
//!
//! One interleaved binding: position (location 0), color (location 1) and
//! texture coordinate (location 2). The offsets must agree with the
//! `#[repr(C)]` layout of `Vertex` and with the vertex shader inputs.

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::primitives::Vertex;

/// Vertex input layout for the engine's `Vertex` type
pub struct VertexLayout;

impl VertexLayout {
    /// Binding 0, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position, color and texture coordinate attributes
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}
