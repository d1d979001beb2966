//! Swapchain creation and surface property selection
//!
//! The `choose_*` functions are pure so the selection policy can be tested
//! without a surface.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use ash::Device;

use crate::render::backends::vulkan::resources::image::create_image_view;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Swapchain formats in order of preference, all with SRGB-nonlinear color space
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// Pick the surface format
///
/// A lone `UNDEFINED` entry means the surface accepts anything; otherwise a
/// preferred UNORM format in SRGB-nonlinear wins, falling back to the first
/// reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;

    match formats {
        [] => Err(VulkanError::InitializationFailed(
            "Surface reports no formats".to_string(),
        )),
        [only] if only.format == vk::Format::UNDEFINED => Ok(vk::SurfaceFormatKHR {
            format: PREFERRED_FORMATS[0],
            color_space: srgb,
        }),
        _ => Ok(PREFERRED_FORMATS
            .iter()
            .find_map(|&preferred| {
                formats
                    .iter()
                    .find(|f| f.format == preferred && f.color_space == srgb)
                    .copied()
            })
            .unwrap_or(formats[0])),
    }
}

/// Mailbox when available, otherwise FIFO (always supported)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the framebuffer size clamped to the surface limits when
/// the surface reports the `u32::MAX` "match window" sentinel
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer.width.clamp(min.width, max.width),
        height: framebuffer.height.clamp(min.height, max.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain and the color views of its images
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Query the surface and create a swapchain sized to `framebuffer`
    pub fn new(context: &VulkanContext, framebuffer: vk::Extent2D) -> VulkanResult<Self> {
        let physical = context.physical_device().device;
        let surface = context.surface;
        let surface_loader = &context.surface_loader;

        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::from_vk)?,
                surface_loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::from_vk)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::from_vk)?,
            )
        };

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, framebuffer);
        let image_count = choose_image_count(&capabilities);

        let graphics_family = context.physical_device().graphics_family;
        let present_family = context.physical_device().present_family;
        let queue_families = [graphics_family, present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if graphics_family == present_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let loader = context.swapchain_loader().clone();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::from_vk)?;

        // Owned from here so Drop releases the swapchain on a later failure.
        let mut this = Self {
            device: context.raw_device().clone(),
            loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            extent,
        };

        this.images = unsafe { this.loader.get_swapchain_images(swapchain) }.map_err(VulkanError::from_vk)?;
        for &image in &this.images {
            let view = create_image_view(&this.device, image, format.format, vk::ImageAspectFlags::COLOR)?;
            this.image_views.push(view);
        }

        log::info!(
            "Swapchain created: {} image(s), {:?}/{:?}, {:?}, {}x{}",
            this.images.len(),
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height
        );
        Ok(this)
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Extension loader the swapchain was created with
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Color views, one per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
