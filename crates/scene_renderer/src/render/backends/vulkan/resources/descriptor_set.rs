//! Descriptor set layouts, pools and writes
//!
//! The scene uses two set layouts, always bound in this order:
//!
//! - set 0, per frame: view-projection uniform (binding 0, vertex stage) and,
//!   when transforms use dynamic uniforms, the model-matrix record
//!   (binding 1, dynamic uniform, vertex stage)
//! - set 1, per texture: combined image sampler (binding 0, fragment stage)
//!
//! In push-constant mode the model matrix travels in a 64-byte push range
//! visible to the vertex stage.

use ash::{vk, Device};

use crate::core::TransformMode;
use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Size of the per-object transform pushed before each model's draws
pub const TRANSFORM_PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<Mat4>() as u32;

/// Builder for descriptor set layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a uniform buffer binding selected by a dynamic offset at bind time
    pub fn add_dynamic_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Bindings declared so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::from_vk)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

/// Descriptor set layout wrapper with RAII cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Get the layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Append-only descriptor pool with a fixed set ceiling
///
/// Sets are never freed individually; once `max_sets` have been handed out
/// further allocations fail with [`VulkanError::CapacityExceeded`].
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    max_sets: u32,
    allocated: u32,
    label: &'static str,
}

impl DescriptorPool {
    /// Create a pool for up to `max_sets` sets drawing from `pool_sizes`
    pub fn new(
        device: &Device,
        label: &'static str,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::from_vk)?;

        log::debug!("Created {} descriptor pool with {} set(s)", label, max_sets);
        Ok(Self {
            pool,
            device: device.clone(),
            max_sets,
            allocated: 0,
            label,
        })
    }

    /// Allocate one set per entry in `layouts`
    pub fn allocate_descriptor_sets(
        &mut self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let requested = layouts.len() as u32;
        if self.allocated + requested > self.max_sets {
            return Err(VulkanError::CapacityExceeded {
                what: self.label,
                limit: self.max_sets as usize,
            });
        }

        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::from_vk)?;
        self.allocated += requested;
        Ok(sets)
    }

    /// Sets handed out so far
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorImageInfo,
    },
}

/// Collects descriptor writes and applies them in one `vkUpdateDescriptorSets`
///
/// Write structs point into the info arrays, so they are only assembled in
/// [`update`](Self::update) once those arrays are final.
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform buffer binding at `range` bytes of `buffer` from `offset`
    pub fn write_buffer(
        self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.push_buffer(set, binding, vk::DescriptorType::UNIFORM_BUFFER, buffer, offset, range)
    }

    /// Point a dynamic uniform binding at one `range`-sized record of `buffer`
    pub fn write_dynamic_buffer(
        self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> Self {
        self.push_buffer(set, binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, buffer, 0, range)
    }

    fn push_buffer(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.pending.push(PendingWrite::Buffer {
            set,
            binding,
            ty,
            info: vk::DescriptorBufferInfo { buffer, offset, range },
        });
        self
    }

    /// Bind a sampled image view in `SHADER_READ_ONLY_OPTIMAL`
    pub fn write_image(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        self.pending.push(PendingWrite::Image {
            set,
            binding,
            info: vk::DescriptorImageInfo {
                sampler,
                image_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        });
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply all queued writes
    pub fn update(self, device: &Device) {
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = self
            .pending
            .iter()
            .map(|w| match w {
                PendingWrite::Buffer { info, .. } => [*info],
                PendingWrite::Image { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = self
            .pending
            .iter()
            .map(|w| match w {
                PendingWrite::Image { info, .. } => [*info],
                PendingWrite::Buffer { .. } => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, w)| match w {
                PendingWrite::Buffer { set, binding, ty, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*ty)
                    .buffer_info(&buffer_infos[i])
                    .build(),
                PendingWrite::Image { set, binding, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[i])
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Binding 0 of the per-frame set
pub const VIEW_PROJECTION_BINDING: u32 = 0;
/// Binding 1 of the per-frame set (dynamic uniform mode only)
pub const MODEL_UNIFORM_BINDING: u32 = 1;
/// Binding 0 of the per-texture set
pub const TEXTURE_SAMPLER_BINDING: u32 = 0;

/// Per-frame set layout bindings for `mode`
pub fn per_frame_layout_builder(mode: TransformMode) -> DescriptorSetLayoutBuilder {
    let builder = DescriptorSetLayoutBuilder::new().add_uniform_buffer(VIEW_PROJECTION_BINDING, vk::ShaderStageFlags::VERTEX);
    match mode {
        TransformMode::PushConstant => builder,
        TransformMode::DynamicUniform => {
            builder.add_dynamic_uniform_buffer(MODEL_UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
        }
    }
}

/// Per-texture set layout bindings
pub fn texture_layout_builder() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_combined_image_sampler(TEXTURE_SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT)
}

/// Push constant ranges for `mode`
pub fn transform_push_constant_ranges(mode: TransformMode) -> Vec<vk::PushConstantRange> {
    match mode {
        TransformMode::PushConstant => vec![vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: TRANSFORM_PUSH_CONSTANT_SIZE,
        }],
        TransformMode::DynamicUniform => Vec::new(),
    }
}

/// The two descriptor set layouts shared by the pipeline and the recorder
pub struct SceneDescriptorLayouts {
    /// Set 0: view-projection (and dynamic model uniform)
    pub per_frame: DescriptorSetLayout,
    /// Set 1: mesh texture
    pub texture: DescriptorSetLayout,
    /// Transform delivery the layouts were built for
    pub mode: TransformMode,
}

impl SceneDescriptorLayouts {
    /// Create both layouts for `mode`
    pub fn new(device: &Device, mode: TransformMode) -> VulkanResult<Self> {
        Ok(Self {
            per_frame: per_frame_layout_builder(mode).build(device)?,
            texture: texture_layout_builder().build(device)?,
            mode,
        })
    }

    /// Layouts in pipeline-layout order
    pub fn all_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.per_frame.handle(), self.texture.handle()]
    }

    /// Push constant ranges matching these layouts
    pub fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        transform_push_constant_ranges(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_bindings_push_constant_mode() {
        let builder = per_frame_layout_builder(TransformMode::PushConstant);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_per_frame_bindings_dynamic_mode() {
        let builder = per_frame_layout_builder(TransformMode::DynamicUniform);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].binding, MODEL_UNIFORM_BINDING);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
    }

    #[test]
    fn test_texture_binding_is_fragment_sampler() {
        let builder = texture_layout_builder();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_push_range_only_in_push_constant_mode() {
        let ranges = transform_push_constant_ranges(TransformMode::PushConstant);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].size, 64);
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        assert!(transform_push_constant_ranges(TransformMode::DynamicUniform).is_empty());
    }

    #[test]
    fn test_writer_queues_writes() {
        let writer = DescriptorSetWriter::new()
            .write_buffer(vk::DescriptorSet::null(), 0, vk::Buffer::null(), 0, 128)
            .write_image(vk::DescriptorSet::null(), 0, vk::ImageView::null(), vk::Sampler::null());
        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
    }
}
