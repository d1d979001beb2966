//! Asset import collaborators
//!
//! The renderer never parses files itself. Images come through an
//! [`ImageDecoder`] and model files through a [`SceneImporter`]; both report
//! failures as [`AssetError`], which the renderer treats as recoverable.

pub mod image_loader;
pub mod model_importer;

pub use image_loader::{ImageData, ImageDecoder, ImageFileDecoder};
pub use model_importer::{
    ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene, ObjImporter, SceneImporter,
};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
