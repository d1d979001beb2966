//! Host-to-device transfers
//!
//! Data that must live in device-local memory is written into a
//! host-visible staging buffer and then copied on the GPU with a one-shot
//! command buffer:
//!
//! allocate -> begin(ONE_TIME_SUBMIT) -> record -> end -> submit -> wait idle -> free
//!
//! The queue wait serializes every transfer. Transfers only happen at load
//! time, never inside the frame loop.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::assets::ImageData;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::image::{Image, ImageDesc, LayoutTransition};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Format used for every uploaded texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Command pool and queue used for one-shot transfer submissions
pub struct TransferContext<'a> {
    device: &'a Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
}

impl<'a> TransferContext<'a> {
    /// Borrow a pool and queue for transfers
    pub fn new(device: &'a Device, command_pool: vk::CommandPool, queue: vk::Queue) -> Self {
        Self {
            device,
            command_pool,
            queue,
        }
    }

    /// Record commands into a fresh command buffer, submit, and wait for completion
    pub fn one_shot<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::from_vk)?
        };
        let command_buffer = command_buffers[0];

        let result = self.record_and_submit(command_buffer, record);

        unsafe {
            self.device.free_command_buffers(self.command_pool, &command_buffers);
        }
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::from_vk)?;
        }

        record(self.device, command_buffer);

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::from_vk)?;
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::from_vk)?;
            self.device.queue_wait_idle(self.queue).map_err(VulkanError::from_vk)
        }
    }

    /// Copy `size` bytes from the start of `src` to the start of `dst`
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        self.one_shot(|device, cb| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cb, src, dst, &[region]) };
        })
    }

    /// Copy tightly packed pixels from `src` into `image` (must be in TRANSFER_DST_OPTIMAL)
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, image: vk::Image, extent: vk::Extent2D) -> VulkanResult<()> {
        self.one_shot(|device, cb| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(cb, src, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]);
            }
        })
    }

    /// Move `image` between layouts with the barrier from [`LayoutTransition::between`]
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let transition = LayoutTransition::between(old_layout, new_layout)?;
        let barrier = transition.barrier(image);

        self.one_shot(|device, cb| unsafe {
            device.cmd_pipeline_barrier(
                cb,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }
}

/// Create a device-local buffer holding `data`, uploaded through a staging buffer
pub fn create_device_local_buffer<T: Pod>(
    context: &VulkanContext,
    transfer: &TransferContext<'_>,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> VulkanResult<Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "cannot create an empty device-local buffer".to_string(),
        });
    }
    let size = bytes.len() as vk::DeviceSize;

    let staging = Buffer::host_visible(context, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
    staging.write_bytes(0, bytes)?;

    let buffer = Buffer::new(
        context,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    transfer.copy_buffer(staging.handle(), buffer.handle(), size)?;

    Ok(buffer)
}

/// Upload RGBA8 pixels into a sampled, device-local image
///
/// The image ends in `SHADER_READ_ONLY_OPTIMAL`. Pixel data that does not
/// cover the whole image is an asset error.
pub fn upload_texture_image(
    context: &VulkanContext,
    transfer: &TransferContext<'_>,
    image_data: &ImageData,
) -> VulkanResult<Image> {
    image_data.validate()?;

    let extent = vk::Extent2D {
        width: image_data.width,
        height: image_data.height,
    };

    let staging = Buffer::host_visible(
        context,
        image_data.size_bytes() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    staging.write_bytes(0, &image_data.data)?;

    let image = Image::new(
        context,
        &ImageDesc {
            extent,
            format: TEXTURE_FORMAT,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: vk::ImageAspectFlags::COLOR,
        },
    )?;

    transfer.transition_image_layout(
        image.handle(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    transfer.copy_buffer_to_image(staging.handle(), image.handle(), extent)?;
    transfer.transition_image_layout(
        image.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    Ok(image)
}
