//! Image decoding for texture data
//!
//! Textures are uploaded as tightly packed RGBA8, so every decoder converts to
//! that layout before handing pixels to the renderer.

use std::path::Path;

use crate::assets::AssetError;

/// Decoded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path using the `image` crate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();

        log::debug!("Loading image from: {:?}", path_ref);

        if !path_ref.exists() {
            return Err(AssetError::NotFound(path_ref.display().to_string()));
        }

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image {}: {}", path_ref.display(), e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Self::from_rgba(rgba_img.into_raw(), width, height)
    }

    /// Decode an image held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image from bytes: {}", e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        Self::from_rgba(rgba_img.into_raw(), width, height)
    }

    /// Wrap raw RGBA8 pixels, checking that the buffer matches the dimensions
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Self, AssetError> {
        let image = Self { data, width, height };
        image.validate()?;
        Ok(image)
    }

    /// Check for a non-empty size and exactly `width * height` RGBA8 pixels
    pub fn validate(&self) -> Result<(), AssetError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "RGBA buffer of {} bytes does not match {}x{}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Create a solid color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Turns an image file into RGBA8 pixels
pub trait ImageDecoder {
    /// Decode the file at `path`
    fn decode(&self, path: &Path) -> Result<ImageData, AssetError>;
}

/// [`ImageDecoder`] backed by the `image` crate (PNG and JPEG)
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileDecoder;

impl ImageDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> Result<ImageData, AssetError> {
        ImageData::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_pixel_buffer_rejected() {
        let short = ImageData {
            data: vec![0; 4],
            width: 2,
            height: 2,
        };
        assert!(matches!(short.validate(), Err(AssetError::InvalidData(_))));
        assert!(ImageData::from_rgba(vec![0; 16], 2, 2).is_ok());
        assert!(ImageData::from_rgba(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 4);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_from_rgba_rejects_mismatched_buffer() {
        assert!(ImageData::from_rgba(vec![0; 16], 2, 2).is_ok());
        assert!(matches!(
            ImageData::from_rgba(vec![0; 15], 2, 2),
            Err(AssetError::InvalidData(_))
        ));
        assert!(ImageData::from_rgba(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = ImageFileDecoder.decode(Path::new("definitely/not/here.png"));
        assert!(matches!(result, Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_decode_png_from_memory() {
        let mut png = Vec::new();
        let pixels = image::RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 40, 50, 60, 255]).unwrap();
        pixels
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = ImageData::from_bytes(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.data, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
