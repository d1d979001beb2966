//! Core renderer settings

pub mod config;

pub use config::{AssetConfig, CameraConfig, RendererConfig, ShaderConfig, TransformMode};
