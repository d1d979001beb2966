//! Mesh geometry on the CPU side

/// Interleaved vertex: position, color, texture coordinate (32 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Vertex color
    pub color: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

// Only f32 arrays, no padding.
unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// White vertex at `position` with the given texture coordinate
    pub fn textured(position: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self::new(position, [1.0, 1.0, 1.0], tex_coord)
    }
}

/// Vertex and index arrays for one mesh, plus the texture it samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`
    pub indices: Vec<u32>,
    /// Texture handle; 0 is the default white texture
    pub texture_id: usize,
}

impl MeshData {
    /// Create mesh data sampling `texture_id`
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, texture_id: usize) -> Self {
        Self {
            vertices,
            indices,
            texture_id,
        }
    }

    /// Axis-aligned quad in the XY plane centered at `center`
    ///
    /// Four corners wound counter-clockwise with indices `{0, 1, 2, 2, 3, 0}`.
    pub fn quad(center: [f32; 3], half_extent: f32, color: [f32; 3], texture_id: usize) -> Self {
        let [x, y, z] = center;
        let h = half_extent;
        let vertices = vec![
            Vertex::new([x - h, y + h, z], color, [0.0, 1.0]),
            Vertex::new([x - h, y - h, z], color, [0.0, 0.0]),
            Vertex::new([x + h, y - h, z], color, [1.0, 0.0]),
            Vertex::new([x + h, y + h, z], color, [1.0, 1.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0], texture_id)
    }

    /// Number of indices the draw call covers
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Number of triangles in triangle-list topology
    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }

    /// Check that every index references an existing vertex
    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err("mesh has no geometry".to_string());
        }
        if self.indices.len() % 3 != 0 {
            return Err(format!("index count {} is not a multiple of 3", self.indices.len()));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(format!("index {} out of range for {} vertices", bad, self.vertices.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn test_quad_counts() {
        let quad = MeshData::quad([0.0, 0.0, 0.0], 0.5, [1.0, 0.0, 0.0], 0);
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.triangle_count(), 2);
        assert!(quad.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut quad = MeshData::quad([0.0, 0.0, 0.0], 1.0, [1.0, 1.0, 1.0], 0);
        quad.indices[5] = 4;
        assert!(quad.validate().is_err());

        let empty = MeshData::default();
        assert!(empty.validate().is_err());
    }
}
