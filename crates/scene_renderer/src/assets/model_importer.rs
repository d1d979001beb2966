//! Model file import
//!
//! A [`SceneImporter`] turns a model file into an [`ImportedScene`]: a node
//! hierarchy referencing raw sub-meshes, plus one entry per material. The
//! renderer flattens the hierarchy and uploads the geometry; nothing here
//! touches the GPU.

use std::io::BufRead;
use std::path::Path;

use crate::assets::AssetError;

/// Raw sub-mesh as produced by an importer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Texture coordinates, one per position, when the file provides them
    pub tex_coords: Option<Vec<[f32; 2]>>,
    /// Faces as lists of indices into `positions`
    pub faces: Vec<Vec<u32>>,
    /// Index into [`ImportedScene::materials`]
    pub material_index: Option<usize>,
}

/// Material description; only the diffuse texture is used for rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedMaterial {
    /// Diffuse texture path exactly as written in the file
    pub diffuse_texture: Option<String>,
}

/// Node of the imported hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedNode {
    /// Indices into [`ImportedScene::meshes`]
    pub mesh_indices: Vec<usize>,
    /// Child nodes, visited depth-first
    pub children: Vec<ImportedNode>,
}

/// Everything an importer extracted from one model file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedScene {
    /// Root of the node hierarchy
    pub root: ImportedNode,
    /// All sub-meshes referenced by the nodes
    pub meshes: Vec<ImportedMesh>,
    /// All materials referenced by the meshes
    pub materials: Vec<ImportedMaterial>,
}

/// Loads a model file into an [`ImportedScene`]
pub trait SceneImporter {
    /// Import the file at `path`
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError>;
}

/// Wavefront OBJ importer built on `tobj`
///
/// Each OBJ object becomes a child of the root node holding exactly one mesh.
/// Faces are triangulated and V coordinates are flipped to match Vulkan's
/// top-left image origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjImporter;

impl ObjImporter {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        }
    }

    /// Import OBJ text with materials supplied by `material_loader`
    pub fn import_buf<R, F>(reader: &mut R, material_loader: F) -> Result<ImportedScene, AssetError>
    where
        R: BufRead,
        F: Fn(&Path) -> tobj::MTLLoadResult,
    {
        let (models, materials) = tobj::load_obj_buf(reader, &Self::load_options(), material_loader)
            .map_err(|e| AssetError::LoadFailed(format!("OBJ parse error: {e}")))?;
        Ok(Self::convert(models, materials))
    }

    fn convert(
        models: Vec<tobj::Model>,
        materials: Result<Vec<tobj::Material>, tobj::LoadError>,
    ) -> ImportedScene {
        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                log::warn!("Material library could not be loaded, using defaults: {}", e);
                Vec::new()
            }
        };

        let mut scene = ImportedScene {
            materials: materials
                .into_iter()
                .map(|m| ImportedMaterial {
                    diffuse_texture: m.diffuse_texture.filter(|t| !t.is_empty()),
                })
                .collect(),
            ..Default::default()
        };

        for model in models {
            let mesh = model.mesh;
            let positions = mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect::<Vec<_>>();
            let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
                mesh.texcoords
                    .chunks_exact(2)
                    .map(|t| [t[0], 1.0 - t[1]])
                    .collect::<Vec<_>>()
            });
            let faces = mesh.indices.chunks(3).map(<[u32]>::to_vec).collect();

            scene.root.children.push(ImportedNode {
                mesh_indices: vec![scene.meshes.len()],
                children: Vec::new(),
            });
            scene.meshes.push(ImportedMesh {
                positions,
                tex_coords,
                faces,
                material_index: mesh.material_id,
            });
        }

        scene
    }
}

impl SceneImporter for ObjImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError> {
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let (models, materials) = tobj::load_obj(path, &Self::load_options())
            .map_err(|e| AssetError::LoadFailed(format!("Failed to import {}: {}", path.display(), e)))?;

        let scene = Self::convert(models, materials);
        log::info!(
            "Imported {} mesh(es) and {} material(s) from {}",
            scene.meshes.len(),
            scene.materials.len(),
            path.display()
        );
        Ok(scene)
    }
}
