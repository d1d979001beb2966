//! Framebuffers and the shared depth buffer

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::image::{Image, ImageDesc};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose `tiling` features include `features`
///
/// `properties` answers the format-properties query for one format.
pub fn choose_depth_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: F,
) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties(format);
            let supported = match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features,
                _ => props.optimal_tiling_features,
            };
            supported.contains(features)
        })
        .ok_or_else(|| VulkanError::InitializationFailed("No supported depth format".to_string()))
}

/// Depth image shared by every framebuffer
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Create a depth attachment of `format` sized to `extent`
    pub fn new(context: &VulkanContext, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<Self> {
        let image = Image::new(
            context,
            &ImageDesc {
                extent,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
        )?;
        log::debug!("Depth buffer {:?} {}x{}", format, extent.width, extent.height);
        Ok(Self { image })
    }

    /// Depth view
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Depth format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer binding `attachments` to `render_pass`
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }.map_err(VulkanError::from_vk)?;

        Ok(Self {
            device: device.clone(),
            framebuffer,
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(features: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    #[test]
    fn test_depth_format_follows_preference() {
        let chosen = choose_depth_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| optimal(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
        )
        .unwrap();
        assert_eq!(chosen, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_depth_format_skips_unsupported() {
        let chosen = choose_depth_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| match format {
                vk::Format::D24_UNORM_S8_UINT => optimal(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
                _ => optimal(vk::FormatFeatureFlags::SAMPLED_IMAGE),
            },
        )
        .unwrap();
        assert_eq!(chosen, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn test_tiling_selects_feature_mask() {
        // Supported only with linear tiling, so an optimal-tiling query fails.
        let linear_only = |_: vk::Format| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert!(choose_depth_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, features, linear_only).is_err());
        assert_eq!(
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::LINEAR, features, linear_only).unwrap(),
            vk::Format::D32_SFLOAT_S8_UINT
        );
    }
}
