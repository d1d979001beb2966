//! # Scene Renderer
//!
//! A frame-synchronized Vulkan renderer for textured meshes.
//!
//! ## Features
//!
//! - **Frames in flight**: fence-paced frame slots with per-image ownership tracking
//! - **Model loading**: OBJ scenes with diffuse textures, flattened into draw order
//! - **Per-object transforms**: push constants or dynamically-offset uniform buffers
//! - **Configuration**: TOML or RON renderer settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut window = Window::new("Viewer", 800, 600)?;
//!     let mut renderer = VulkanRenderer::init(&window, RendererConfig::new("Viewer"))?;
//!     let model = renderer.create_mesh_model("Models/scene.obj")?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.update_model(model, Mat4::identity())?;
//!         renderer.draw()?;
//!     }
//!     renderer.cleanup()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_arguments
)]

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageData, ImportedScene},
        config::Config,
        core::{CameraConfig, RendererConfig, ShaderConfig, TransformMode},
        foundation::math::{Mat4, Vec3},
        render::{
            backends::vulkan::{VulkanError, VulkanRenderer, VulkanResult, Window, WindowSurface},
            primitives::{MeshData, Vertex},
        },
    };
}
