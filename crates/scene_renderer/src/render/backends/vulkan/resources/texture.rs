//! Textures and the shared sampler
//!
//! Each texture is one owning struct (image, view, descriptor set) stored in
//! a [`TextureArena`]. Its handle is its position in the arena, which is also
//! the order its descriptor set was allocated in. Handle 0 is always a 1x1
//! opaque white texture used by materials without a diffuse map.

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::render::backends::vulkan::resources::descriptor_set::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetWriter, TEXTURE_SAMPLER_BINDING,
};
use crate::render::backends::vulkan::resources::image::Image;
use crate::render::backends::vulkan::resources::transfer::{upload_texture_image, TransferContext};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Handle of the built-in white texture
pub const DEFAULT_TEXTURE: usize = 0;

/// Upper bound on anisotropic filtering
const MAX_ANISOTROPY: f32 = 16.0;

/// Sampler parameters: linear filtering, repeat addressing, optional anisotropy
pub fn sampler_create_info(max_anisotropy: Option<f32>) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(max_anisotropy.is_some())
        .max_anisotropy(max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .build()
}

/// Sampler shared by every texture
pub struct TextureSampler {
    device: Device,
    sampler: vk::Sampler,
}

impl TextureSampler {
    /// Create the sampler, enabling anisotropy only when the device supports it
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let physical = context.physical_device();
        let anisotropy = physical
            .supports_anisotropy()
            .then(|| MAX_ANISOTROPY.min(physical.properties.limits.max_sampler_anisotropy));

        let create_info = sampler_create_info(anisotropy);
        let device = context.raw_device().clone();
        let sampler = unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::from_vk)? };

        log::debug!("Created texture sampler (anisotropy {:?})", anisotropy);
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for TextureSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Uploaded texture with its descriptor set
pub struct Texture {
    image: Image,
    descriptor_set: vk::DescriptorSet,
}

impl Texture {
    /// Descriptor set binding this texture to the shared sampler
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

/// All textures and the pool their descriptor sets come from
pub struct TextureArena {
    textures: Vec<Texture>,
    pool: DescriptorPool,
    sampler: TextureSampler,
}

impl TextureArena {
    /// Create the arena with room for `capacity` textures and upload the default texture
    pub fn new(
        context: &VulkanContext,
        transfer: &TransferContext<'_>,
        layout: &DescriptorSetLayout,
        capacity: usize,
    ) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: capacity as u32,
        }];
        let pool = DescriptorPool::new(context.raw_device(), "texture", capacity as u32, &pool_sizes)?;
        let sampler = TextureSampler::new(context)?;

        let mut arena = Self {
            textures: Vec::with_capacity(capacity),
            pool,
            sampler,
        };

        let white = ImageData::solid_color(1, 1, [255, 255, 255, 255]);
        let handle = arena.insert(context, transfer, layout, &white)?;
        debug_assert_eq!(handle, DEFAULT_TEXTURE);

        Ok(arena)
    }

    /// Upload `image_data`, allocate and write its descriptor set, and return its handle
    pub fn insert(
        &mut self,
        context: &VulkanContext,
        transfer: &TransferContext<'_>,
        layout: &DescriptorSetLayout,
        image_data: &ImageData,
    ) -> VulkanResult<usize> {
        let pool = &mut self.pool;
        let (image, descriptor_set) = upload_then_allocate(
            || upload_texture_image(context, transfer, image_data),
            || Ok(pool.allocate_descriptor_sets(&[layout.handle()])?[0]),
        )?;

        DescriptorSetWriter::new()
            .write_image(descriptor_set, TEXTURE_SAMPLER_BINDING, image.view(), self.sampler.handle())
            .update(context.raw_device());

        let handle = self.textures.len();
        self.textures.push(Texture { image, descriptor_set });
        log::debug!(
            "Texture {} uploaded ({}x{})",
            handle,
            image_data.width,
            image_data.height
        );
        Ok(handle)
    }

    /// Look up a texture by handle
    pub fn get(&self, handle: usize) -> Option<&Texture> {
        self.textures.get(handle)
    }

    /// Descriptor set for `handle`
    pub fn descriptor_set(&self, handle: usize) -> Option<vk::DescriptorSet> {
        self.get(handle).map(Texture::descriptor_set)
    }

    /// Number of textures, including the default one
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Always false once constructed; the default texture is always present
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Upload first, then allocate; a failed upload leaves the descriptor pool untouched
fn upload_then_allocate<I, S>(
    upload: impl FnOnce() -> VulkanResult<I>,
    allocate: impl FnOnce() -> VulkanResult<S>,
) -> VulkanResult<(I, S)> {
    let image = upload()?;
    let descriptor_set = allocate()?;
    Ok((image, descriptor_set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_upload_allocates_nothing() {
        let result: VulkanResult<((), ())> = upload_then_allocate(
            || Err(VulkanError::OutOfMemory { requested: 64 }),
            || panic!("descriptor set allocated for a failed upload"),
        );
        assert!(matches!(result, Err(VulkanError::OutOfMemory { .. })));
    }

    #[test]
    fn test_sampler_without_anisotropy() {
        let info = sampler_create_info(None);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.max_anisotropy, 1.0);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
    }

    #[test]
    fn test_sampler_with_anisotropy() {
        let info = sampler_create_info(Some(8.0));
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 8.0);
    }
}
