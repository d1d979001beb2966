//! Meshes, models and model loading
//!
//! Loading a model file runs in three steps:
//!
//! 1. every material's diffuse texture becomes a texture handle
//!    (file name only, resolved in the texture directory; handle 0 when the
//!    material has none or the file cannot be decoded)
//! 2. the node hierarchy is flattened depth-first into one ordered mesh list
//! 3. each sub-mesh is converted to interleaved vertices and uploaded
//!
//! Steps 1 and 2 are plain data transformations and are unit tested without
//! a GPU.

use ash::vk;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::assets::{AssetError, ImageData, ImageDecoder, ImportedMesh, ImportedNode, ImportedScene, SceneImporter};
use crate::foundation::math::Mat4;
use crate::render::backends::vulkan::rendering::command_recorder::{
    DrawableMesh, DrawableModel, MeshDraw, TextureBindings,
};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorSetLayout;
use crate::render::backends::vulkan::resources::texture::{TextureArena, DEFAULT_TEXTURE};
use crate::render::backends::vulkan::resources::transfer::{create_device_local_buffer, TransferContext};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::primitives::{MeshData, Vertex};

/// Everything needed to put new resources on the GPU
pub struct GpuUploader<'a> {
    /// Device context
    pub context: &'a VulkanContext,
    /// One-shot transfer submission
    pub transfer: TransferContext<'a>,
    /// Layout for texture descriptor sets
    pub texture_layout: &'a DescriptorSetLayout,
}

/// Device-local vertex and index buffers for one sub-mesh
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    texture_id: usize,
}

impl Mesh {
    /// Upload `data` through staging buffers
    pub fn new(uploader: &GpuUploader<'_>, data: &MeshData) -> VulkanResult<Self> {
        data.validate().map_err(AssetError::InvalidData)?;

        let vertex_buffer = create_device_local_buffer(
            uploader.context,
            &uploader.transfer,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &data.vertices,
        )?;
        let index_buffer = create_device_local_buffer(
            uploader.context,
            &uploader.transfer,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &data.indices,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.index_count(),
            texture_id: data.texture_id,
        })
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Texture handle sampled by this mesh
    pub fn texture_id(&self) -> usize {
        self.texture_id
    }
}

impl DrawableMesh for Mesh {
    fn draw(&self) -> MeshDraw {
        MeshDraw {
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.handle(),
            index_count: self.index_count,
            texture_id: self.texture_id,
        }
    }
}

/// Ordered meshes sharing one world transform
pub struct Model {
    meshes: Vec<Mesh>,
    transform: Mat4,
}

impl Model {
    /// Wrap meshes with an identity transform
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self {
            meshes,
            transform: Mat4::identity(),
        }
    }

    /// Number of meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Replace the world transform
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }
}

impl DrawableModel for Model {
    type Mesh = Mesh;

    fn transform(&self) -> &Mat4 {
        &self.transform
    }

    fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }
}

/// File name of a texture path: everything after the last `\` or `/`
pub fn texture_file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// One entry per material: its diffuse texture file name, or empty when it has none
pub fn collect_material_textures(scene: &ImportedScene) -> Vec<String> {
    scene
        .materials
        .iter()
        .map(|material| {
            material
                .diffuse_texture
                .as_deref()
                .map(texture_file_name)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Mesh indices of the hierarchy in depth-first order (a node's own meshes before its children's)
pub fn flatten_scene(root: &ImportedNode) -> Vec<usize> {
    let mut order = Vec::new();
    flatten_node(root, &mut order);
    order
}

fn flatten_node(node: &ImportedNode, order: &mut Vec<usize>) {
    order.extend_from_slice(&node.mesh_indices);
    for child in &node.children {
        flatten_node(child, order);
    }
}

/// Convert an imported sub-mesh to white, textured vertices and a flat index list
///
/// Missing texture coordinates default to (0, 0); a missing or unknown
/// material samples the default texture.
pub fn convert_mesh(mesh: &ImportedMesh, material_textures: &[usize]) -> MeshData {
    let vertices = mesh
        .positions
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            let tex_coord = mesh
                .tex_coords
                .as_ref()
                .and_then(|uvs| uvs.get(i).copied())
                .unwrap_or([0.0, 0.0]);
            Vertex::textured(position, tex_coord)
        })
        .collect();

    let indices = mesh.faces.iter().flatten().copied().collect();

    let texture_id = mesh
        .material_index
        .and_then(|m| material_textures.get(m).copied())
        .unwrap_or(DEFAULT_TEXTURE);

    MeshData::new(vertices, indices, texture_id)
}

/// Flatten the scene and convert every referenced mesh
///
/// Sub-meshes without faces (empty groups left by exporters) are skipped.
/// Any other bad geometry is an [`AssetError::InvalidData`].
pub fn assemble_meshes(scene: &ImportedScene, material_textures: &[usize]) -> Result<Vec<MeshData>, AssetError> {
    let mut meshes = Vec::new();
    for index in flatten_scene(&scene.root) {
        let mesh = scene
            .meshes
            .get(index)
            .ok_or_else(|| AssetError::InvalidData(format!("node references missing mesh {}", index)))?;

        if mesh.faces.is_empty() {
            log::warn!("Skipping mesh {} with no faces", index);
            continue;
        }

        let data = convert_mesh(mesh, material_textures);
        data.validate()
            .map_err(|reason| AssetError::InvalidData(format!("mesh {}: {}", index, reason)))?;
        meshes.push(data);
    }
    Ok(meshes)
}

/// File name to texture handle cache
///
/// A file that fails to decode maps to the default texture and is not
/// cached, so a later load can retry it.
#[derive(Debug, Default)]
pub struct TextureNameCache {
    handles: HashMap<String, usize>,
}

impl TextureNameCache {
    /// Return the cached handle or decode and upload the file
    pub fn resolve<D, U>(&mut self, file_name: &str, decode: D, upload: U) -> VulkanResult<usize>
    where
        D: FnOnce() -> Result<ImageData, AssetError>,
        U: FnOnce(&ImageData) -> VulkanResult<usize>,
    {
        if file_name.is_empty() {
            return Ok(DEFAULT_TEXTURE);
        }
        if let Some(&handle) = self.handles.get(file_name) {
            log::debug!("Texture '{}' already loaded as {}", file_name, handle);
            return Ok(handle);
        }

        let image = match decode() {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Texture '{}' unavailable, using default texture: {}", file_name, e);
                return Ok(DEFAULT_TEXTURE);
            }
        };

        let handle = upload(&image)?;
        self.handles.insert(file_name.to_string(), handle);
        Ok(handle)
    }

    /// Number of cached file names
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Owner of all models and textures
pub struct ResourcePool {
    models: Vec<Model>,
    textures: TextureArena,
    texture_names: TextureNameCache,
    texture_directory: PathBuf,
    max_objects: usize,
}

impl ResourcePool {
    /// Create the pool and its default texture
    pub fn new(uploader: &GpuUploader<'_>, texture_directory: PathBuf, max_objects: usize) -> VulkanResult<Self> {
        let textures = TextureArena::new(
            uploader.context,
            &uploader.transfer,
            uploader.texture_layout,
            max_objects,
        )?;

        Ok(Self {
            models: Vec::new(),
            textures,
            texture_names: TextureNameCache::default(),
            texture_directory,
            max_objects,
        })
    }

    /// Load `file_name` from the texture directory and return its handle
    ///
    /// Decode failures fall back to the default texture.
    pub fn create_texture(
        &mut self,
        uploader: &GpuUploader<'_>,
        decoder: &dyn ImageDecoder,
        file_name: &str,
    ) -> VulkanResult<usize> {
        let path = self.texture_directory.join(file_name);
        let textures = &mut self.textures;
        self.texture_names.resolve(
            file_name,
            || decoder.decode(&path),
            |image| textures.insert(uploader.context, &uploader.transfer, uploader.texture_layout, image),
        )
    }

    /// Import a model file, upload its textures and meshes, and return the model handle
    pub fn load_model(
        &mut self,
        uploader: &GpuUploader<'_>,
        importer: &dyn SceneImporter,
        decoder: &dyn ImageDecoder,
        path: &Path,
    ) -> VulkanResult<usize> {
        self.check_model_capacity()?;

        let scene = importer.import(path)?;

        let material_textures = collect_material_textures(&scene)
            .iter()
            .map(|file_name| self.create_texture(uploader, decoder, file_name))
            .collect::<VulkanResult<Vec<_>>>()?;

        let meshes = assemble_meshes(&scene, &material_textures)?;
        let handle = self.create_model_from_meshes(uploader, &meshes)?;

        log::info!(
            "Loaded model {} from {} ({} mesh(es), {} material(s))",
            handle,
            path.display(),
            meshes.len(),
            material_textures.len()
        );
        Ok(handle)
    }

    /// Upload hand-built geometry as a new model
    pub fn create_model_from_meshes(&mut self, uploader: &GpuUploader<'_>, meshes: &[MeshData]) -> VulkanResult<usize> {
        self.check_model_capacity()?;

        if let Some(bad) = meshes.iter().find(|m| m.texture_id >= self.textures.len()) {
            return Err(VulkanError::ResourceNotFound {
                id: bad.texture_id as u64,
            });
        }

        let meshes = meshes
            .iter()
            .map(|data| Mesh::new(uploader, data))
            .collect::<VulkanResult<Vec<_>>>()?;

        self.models.push(Model::new(meshes));
        Ok(self.models.len() - 1)
    }

    fn check_model_capacity(&self) -> VulkanResult<()> {
        if self.models.len() >= self.max_objects {
            return Err(VulkanError::CapacityExceeded {
                what: "models",
                limit: self.max_objects,
            });
        }
        Ok(())
    }

    /// Look up a model for modification
    pub fn model_mut(&mut self, handle: usize) -> Option<&mut Model> {
        self.models.get_mut(handle)
    }

    /// All models in draw order
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// All textures
    pub fn textures(&self) -> &TextureArena {
        &self.textures
    }
}

impl TextureBindings for TextureArena {
    fn texture_set(&self, texture_id: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_set(texture_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImportedMaterial;

    fn mesh(vertex_count: usize, material_index: Option<usize>) -> ImportedMesh {
        ImportedMesh {
            positions: (0..vertex_count).map(|i| [i as f32, 0.0, 0.0]).collect(),
            tex_coords: None,
            faces: vec![vec![0, 1, 2]],
            material_index,
        }
    }

    #[test]
    fn test_texture_file_name_strips_directories() {
        assert_eq!(texture_file_name("C:\\models\\tex\\brick.png"), "brick.png");
        assert_eq!(texture_file_name("tex/wood.jpg"), "wood.jpg");
        assert_eq!(texture_file_name("plain.png"), "plain.png");
    }

    #[test]
    fn test_material_without_texture_is_empty_name() {
        let scene = ImportedScene {
            materials: vec![
                ImportedMaterial { diffuse_texture: None },
                ImportedMaterial {
                    diffuse_texture: Some("maps\\diffuse.png".to_string()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(collect_material_textures(&scene), vec![String::new(), "diffuse.png".to_string()]);
    }

    /// Zero materials yields an empty mapping and meshes fall back to the default texture
    #[test]
    fn test_zero_materials() {
        let scene = ImportedScene {
            root: ImportedNode {
                mesh_indices: vec![0],
                children: Vec::new(),
            },
            meshes: vec![mesh(3, Some(0))],
            materials: Vec::new(),
        };

        let names = collect_material_textures(&scene);
        assert!(names.is_empty());

        let meshes = assemble_meshes(&scene, &[]).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].texture_id, DEFAULT_TEXTURE);
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let root = ImportedNode {
            mesh_indices: vec![0],
            children: vec![
                ImportedNode {
                    mesh_indices: vec![1],
                    children: vec![ImportedNode {
                        mesh_indices: vec![2, 3],
                        children: Vec::new(),
                    }],
                },
                ImportedNode {
                    mesh_indices: vec![4],
                    children: Vec::new(),
                },
            ],
        };
        assert_eq!(flatten_scene(&root), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_convert_mesh_defaults() {
        let mut imported = mesh(4, Some(1));
        imported.faces = vec![vec![0, 1, 2], vec![2, 3, 0]];
        imported.tex_coords = Some(vec![[0.5, 0.5], [1.0, 0.0]]);

        let data = convert_mesh(&imported, &[0, 7]);
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(data.index_count(), 6);
        assert_eq!(data.triangle_count(), 2);
        assert_eq!(data.texture_id, 7);
        assert_eq!(data.vertices[0].tex_coord, [0.5, 0.5]);
        assert_eq!(data.vertices[3].tex_coord, [0.0, 0.0]);
        assert!(data.vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_missing_mesh_reference_is_invalid_data() {
        let scene = ImportedScene {
            root: ImportedNode {
                mesh_indices: vec![3],
                children: Vec::new(),
            },
            ..Default::default()
        };
        assert!(matches!(assemble_meshes(&scene, &[]), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_faceless_groups_are_skipped() {
        let obj = "o tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\ng nofaces\n";
        let scene = crate::assets::ObjImporter::import_buf(&mut obj.as_bytes(), |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })
        .unwrap();

        let meshes = assemble_meshes(&scene, &[]).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_bad_geometry_is_invalid_data() {
        let mut out_of_range = mesh(3, None);
        out_of_range.faces = vec![vec![0, 1, 7]];
        let mut partial_face = mesh(3, None);
        partial_face.faces = vec![vec![0, 1]];

        for bad in [out_of_range, partial_face] {
            let scene = ImportedScene {
                root: ImportedNode {
                    mesh_indices: vec![0],
                    children: Vec::new(),
                },
                meshes: vec![bad],
                materials: Vec::new(),
            };
            let err = assemble_meshes(&scene, &[]).unwrap_err();
            assert!(matches!(err, AssetError::InvalidData(_)));
            assert!(VulkanError::from(err).is_recoverable());
        }
    }

    #[test]
    fn test_name_cache_uploads_each_file_once() {
        let mut cache = TextureNameCache::default();
        let mut uploads = 0;

        let mut load = |cache: &mut TextureNameCache, name: &str| {
            cache
                .resolve(
                    name,
                    || Ok(ImageData::solid_color(1, 1, [0, 0, 0, 255])),
                    |_| {
                        uploads += 1;
                        Ok(uploads)
                    },
                )
                .unwrap()
        };

        let first = load(&mut cache, "brick.png");
        let second = load(&mut cache, "brick.png");
        let other = load(&mut cache, "wood.png");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(uploads, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_name_cache_decode_failure_uses_default() {
        let mut cache = TextureNameCache::default();
        let handle = cache
            .resolve(
                "missing.png",
                || Err(AssetError::NotFound("missing.png".to_string())),
                |_| panic!("nothing to upload"),
            )
            .unwrap();

        assert_eq!(handle, DEFAULT_TEXTURE);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_name_cache_empty_name_is_default() {
        let mut cache = TextureNameCache::default();
        let handle = cache
            .resolve("", || panic!("nothing to decode"), |_| panic!("nothing to upload"))
            .unwrap();
        assert_eq!(handle, DEFAULT_TEXTURE);
    }

    #[test]
    fn test_name_cache_upload_failure_propagates() {
        let mut cache = TextureNameCache::default();
        let result = cache.resolve(
            "big.png",
            || Ok(ImageData::solid_color(1, 1, [0, 0, 0, 255])),
            |_| Err(VulkanError::CapacityExceeded { what: "texture", limit: 20 }),
        );
        assert!(matches!(result, Err(VulkanError::CapacityExceeded { .. })));
        assert!(cache.is_empty());
    }
}
