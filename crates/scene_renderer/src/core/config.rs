//! # Renderer Configuration
//!
//! Every tunable of the renderer lives here: shader locations, frame pacing,
//! descriptor capacity, camera, and where texture files are resolved from.
//!
//! All types are serde-enabled so a [`RendererConfig`] can be stored as TOML or
//! RON through the [`Config`] trait.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::config::{Config, ConfigError};

/// Directories searched (in order) when resolving shader binaries
const SHADER_DIRS: [&str; 5] = [
    "target/shaders/",
    "shaders/",
    "resources/shaders/",
    "../shaders/",
    "./",
];

/// # Shader Configuration
///
/// Paths to the pre-compiled SPIR-V blobs consumed by the graphics pipeline.
/// The dynamic vertex shader is only loaded when objects use
/// [`TransformMode::DynamicUniform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Vertex shader reading the model matrix from a push constant
    pub vertex_shader_path: String,
    /// Vertex shader reading the model matrix from a dynamic uniform buffer
    pub dynamic_vertex_shader_path: String,
    /// Fragment shader sampling the mesh texture
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a shader configuration from explicit paths
    pub fn new(
        vertex_path: impl Into<String>,
        dynamic_vertex_path: impl Into<String>,
        fragment_path: impl Into<String>,
    ) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            dynamic_vertex_shader_path: dynamic_vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Resolve each file name against the common shader directories
    ///
    /// Falls back to `shaders/<name>` when nothing is found so the error
    /// reported later names the conventional location.
    pub fn with_path_resolution(vertex: &str, dynamic_vertex: &str, fragment: &str) -> Self {
        Self {
            vertex_shader_path: resolve_shader(vertex),
            dynamic_vertex_shader_path: resolve_shader(dynamic_vertex),
            fragment_shader_path: resolve_shader(fragment),
        }
    }

    /// Vertex shader path for the given transform mode
    pub fn vertex_path_for(&self, mode: TransformMode) -> &str {
        match mode {
            TransformMode::PushConstant => &self.vertex_shader_path,
            TransformMode::DynamicUniform => &self.dynamic_vertex_shader_path,
        }
    }

    /// Check that the shaders needed for `mode` exist on disk
    pub fn validate(&self, mode: TransformMode) -> Result<(), ConfigError> {
        for path in [self.vertex_path_for(mode), self.fragment_shader_path.as_str()] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("textured_vert.spv", "textured_dynamic_vert.spv", "textured_frag.spv")
    }
}

fn resolve_shader(file_name: &str) -> String {
    SHADER_DIRS
        .iter()
        .map(|dir| format!("{dir}{file_name}"))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("shaders/{file_name}"))
}

/// How each model's world transform reaches the vertex shader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformMode {
    /// 64-byte push constant per model
    #[default]
    PushConstant,
    /// One aligned record per model in a dynamically-offset uniform buffer
    DynamicUniform,
}

/// Perspective camera used to build the view-projection uniform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Eye position in world space
    pub eye: [f32; 3],
    /// Point the camera looks at
    pub target: [f32; 3],
    /// Up direction
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane distance
    pub near: f32,
    /// Far clip plane distance
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [0.0, 0.0, 3.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Asset lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory that material texture file names are resolved against
    pub texture_directory: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            texture_directory: PathBuf::from("Textures"),
        }
    }
}

/// # Renderer Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Shader binaries
    pub shaders: ShaderConfig,
    /// Number of frame slots the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Ceiling for texture descriptor sets and dynamic uniform records
    pub max_objects: usize,
    /// Background color written by the render pass clear
    pub clear_color: [f32; 4],
    /// Per-object transform delivery
    pub transform_mode: TransformMode,
    /// Whether to enable Vulkan validation layers (`None` follows the build type)
    pub enable_validation: Option<bool>,
    /// Camera used for the view-projection uniform
    pub camera: CameraConfig,
    /// Asset lookup
    pub assets: AssetConfig,
}

impl RendererConfig {
    /// Create a configuration with defaults and the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            max_objects: 20,
            clear_color: [0.6, 0.65, 0.4, 1.0],
            transform_mode: TransformMode::PushConstant,
            enable_validation: None,
            camera: CameraConfig::default(),
            assets: AssetConfig::default(),
        }
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set the descriptor and dynamic-uniform capacity
    pub fn with_max_objects(mut self, objects: usize) -> Self {
        self.max_objects = objects;
        self
    }

    /// Set the transform delivery mode
    pub fn with_transform_mode(mut self, mode: TransformMode) -> Self {
        self.transform_mode = mode;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the texture lookup directory
    pub fn with_texture_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets.texture_directory = dir.into();
        self
    }

    /// Validation setting after resolving the build-type default
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Check ranges without touching the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if !(1..=8).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight must be between 1 and 8, got {}",
                self.max_frames_in_flight
            )));
        }

        if self.max_objects == 0 {
            return Err(ConfigError::Invalid("Max objects must be at least 1".to_string()));
        }

        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(ConfigError::Invalid(format!(
                "Camera clip planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Scene Renderer")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.max_objects, 20);
        assert_eq!(config.transform_mode, TransformMode::PushConstant);
    }

    #[test]
    fn test_frame_count_range() {
        assert!(RendererConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(1).validate().is_ok());
        assert!(RendererConfig::default().with_max_frames_in_flight(8).validate().is_ok());
    }

    #[test]
    fn test_zero_objects_rejected() {
        let config = RendererConfig::default().with_max_objects(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_vertex_path_follows_transform_mode() {
        let shaders = ShaderConfig::new("a.spv", "b.spv", "c.spv");
        assert_eq!(shaders.vertex_path_for(TransformMode::PushConstant), "a.spv");
        assert_eq!(shaders.vertex_path_for(TransformMode::DynamicUniform), "b.spv");
    }

    /// Partial TOML files keep defaults for missing fields
    #[test]
    fn test_toml_partial_override() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "viewer"
            max_objects = 64
            transform_mode = "DynamicUniform"
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "viewer");
        assert_eq!(config.max_objects, 64);
        assert_eq!(config.transform_mode, TransformMode::DynamicUniform);
        assert_eq!(config.max_frames_in_flight, 2);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let path = std::env::temp_dir().join("scene_renderer_config_test.ron");
        let config = RendererConfig::new("ron test").with_max_frames_in_flight(3);
        config.save_to_file(&path).unwrap();

        let loaded = RendererConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
