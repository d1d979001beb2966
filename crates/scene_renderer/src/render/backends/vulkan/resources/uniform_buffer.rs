//! Per-swapchain-image uniform data
//!
//! Each swapchain image owns its own view-projection buffer (and, in
//! dynamic-uniform mode, its own model-matrix buffer) plus the per-frame
//! descriptor set pointing at them. The CPU only rewrites an image's buffers
//! after the frame synchronizer has proven the GPU finished reading them.

use ash::vk;

use crate::core::TransformMode;
use crate::foundation::math::Mat4;
use crate::foundation::memory::{AlignedArena, ArenaIndexError};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::{
    DescriptorPool, DescriptorSetWriter, SceneDescriptorLayouts, MODEL_UNIFORM_BINDING, VIEW_PROJECTION_BINDING,
};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Camera matrices as laid out in the vertex shader's uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProjection {
    /// Projection matrix (column-major)
    pub projection: [[f32; 4]; 4],
    /// View matrix (column-major)
    pub view: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for ViewProjection {}
unsafe impl bytemuck::Zeroable for ViewProjection {}

impl ViewProjection {
    /// Build from nalgebra matrices
    pub fn new(projection: &Mat4, view: &Mat4) -> Self {
        Self {
            projection: (*projection).into(),
            view: (*view).into(),
        }
    }
}

impl Default for ViewProjection {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity())
    }
}

/// One model matrix record in the dynamic uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelUniform {
    /// World transform (column-major)
    pub model: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for ModelUniform {}
unsafe impl bytemuck::Zeroable for ModelUniform {}

impl From<&Mat4> for ModelUniform {
    fn from(matrix: &Mat4) -> Self {
        Self { model: (*matrix).into() }
    }
}

struct DynamicModels {
    arena: AlignedArena<ModelUniform>,
    buffers: Vec<Buffer>,
    offsets: Vec<u32>,
}

/// Uniform buffers and per-frame descriptor sets, one entry per swapchain image
pub struct FrameUniforms {
    view_projection: Vec<Buffer>,
    dynamic: Option<DynamicModels>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
}

impl FrameUniforms {
    /// Create buffers and descriptor sets for `image_count` swapchain images
    pub fn new(
        context: &VulkanContext,
        layouts: &SceneDescriptorLayouts,
        image_count: usize,
        max_objects: usize,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let count = image_count as u32;

        let mut pool_sizes = vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        }];
        if layouts.mode == TransformMode::DynamicUniform {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: count,
            });
        }
        let mut pool = DescriptorPool::new(device, "per-frame", count, &pool_sizes)?;

        let vp_size = std::mem::size_of::<ViewProjection>() as vk::DeviceSize;
        let view_projection = (0..image_count)
            .map(|_| Buffer::host_visible(context, vp_size, vk::BufferUsageFlags::UNIFORM_BUFFER))
            .collect::<VulkanResult<Vec<_>>>()?;

        let dynamic = match layouts.mode {
            TransformMode::PushConstant => None,
            TransformMode::DynamicUniform => {
                let alignment = context.physical_device().min_uniform_buffer_offset_alignment();
                let arena = AlignedArena::<ModelUniform>::new(max_objects, alignment);
                let size = arena.as_bytes().len() as vk::DeviceSize;
                let buffers = (0..image_count)
                    .map(|_| Buffer::host_visible(context, size, vk::BufferUsageFlags::UNIFORM_BUFFER))
                    .collect::<VulkanResult<Vec<_>>>()?;
                log::debug!(
                    "Dynamic model uniforms: {} records at stride {} (alignment {})",
                    max_objects,
                    arena.stride(),
                    alignment
                );
                Some(DynamicModels {
                    arena,
                    buffers,
                    offsets: Vec::with_capacity(max_objects),
                })
            }
        };

        let set_layouts = vec![layouts.per_frame.handle(); image_count];
        let descriptor_sets = pool.allocate_descriptor_sets(&set_layouts)?;

        let mut writer = DescriptorSetWriter::new();
        for (i, &set) in descriptor_sets.iter().enumerate() {
            writer = writer.write_buffer(set, VIEW_PROJECTION_BINDING, view_projection[i].handle(), 0, vp_size);
            if let Some(dynamic) = &dynamic {
                writer = writer.write_dynamic_buffer(
                    set,
                    MODEL_UNIFORM_BINDING,
                    dynamic.buffers[i].handle(),
                    std::mem::size_of::<ModelUniform>() as vk::DeviceSize,
                );
            }
        }
        writer.update(device);

        Ok(Self {
            view_projection,
            dynamic,
            descriptor_sets,
            _pool: pool,
        })
    }

    /// Per-frame descriptor set for `image_index`
    pub fn descriptor_set(&self, image_index: usize) -> vk::DescriptorSet {
        self.descriptor_sets[image_index]
    }

    /// Dynamic offset of each model written by the last [`Self::update`], indexed by model
    ///
    /// `None` when transforms travel as push constants.
    pub fn dynamic_offsets(&self) -> Option<&[u32]> {
        self.dynamic.as_ref().map(|d| d.offsets.as_slice())
    }

    /// Write the camera and model transforms for `image_index`
    ///
    /// Must only be called once the GPU is done reading that image's buffers.
    pub fn update<'a, I>(&mut self, image_index: usize, view_projection: &ViewProjection, transforms: I) -> VulkanResult<()>
    where
        I: IntoIterator<Item = &'a Mat4>,
    {
        let buffer = self.view_projection.get(image_index).ok_or(VulkanError::ResourceNotFound {
            id: image_index as u64,
        })?;
        buffer.write_data(std::slice::from_ref(view_projection))?;

        if let Some(dynamic) = &mut self.dynamic {
            write_model_records(&mut dynamic.arena, &mut dynamic.offsets, transforms)?;
            dynamic.buffers[image_index].write_bytes(0, dynamic.arena.as_bytes())?;
        }

        Ok(())
    }
}

/// Store one record per transform and collect each record's dynamic offset
fn write_model_records<'a, I>(
    arena: &mut AlignedArena<ModelUniform>,
    offsets: &mut Vec<u32>,
    transforms: I,
) -> VulkanResult<()>
where
    I: IntoIterator<Item = &'a Mat4>,
{
    let capacity = arena.capacity();
    let overflow = move |_: ArenaIndexError| VulkanError::CapacityExceeded {
        what: "dynamic model uniforms",
        limit: capacity,
    };

    offsets.clear();
    for (index, transform) in transforms.into_iter().enumerate() {
        let offset = arena.offset_of(index).map_err(overflow)?;
        arena.set(index, &ModelUniform::from(transform)).map_err(overflow)?;
        offsets.push(offset as u32);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_shader_blocks() {
        assert_eq!(std::mem::size_of::<ViewProjection>(), 128);
        assert_eq!(std::mem::size_of::<ModelUniform>(), 64);
    }

    #[test]
    fn test_model_records_report_aligned_offsets() {
        let mut arena = AlignedArena::<ModelUniform>::new(3, 256);
        let mut offsets = vec![99];
        let transforms = [
            Mat4::identity(),
            Mat4::new_translation(&crate::foundation::math::Vec3::new(2.0, 0.0, 0.0)),
        ];

        write_model_records(&mut arena, &mut offsets, &transforms).unwrap();

        assert_eq!(offsets, vec![0, 256]);
        assert_eq!(arena.get(1).unwrap().model[3], [2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_model_records_beyond_capacity() {
        let mut arena = AlignedArena::<ModelUniform>::new(1, 64);
        let mut offsets = Vec::new();
        let transforms = [Mat4::identity(), Mat4::identity()];

        let result = write_model_records(&mut arena, &mut offsets, &transforms);
        assert!(matches!(result, Err(VulkanError::CapacityExceeded { limit: 1, .. })));
    }

    /// nalgebra converts to column arrays, which is GLSL's mat4 layout
    #[test]
    fn test_matrices_stored_column_major() {
        let translation = Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 2.0, 3.0));
        let record = ModelUniform::from(&translation);
        assert_eq!(record.model[3], [1.0, 2.0, 3.0, 1.0]);

        let vp = ViewProjection::new(&Mat4::identity(), &translation);
        assert_eq!(vp.view[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(vp.projection[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
