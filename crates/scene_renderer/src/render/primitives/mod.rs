//! Backend-agnostic geometry types

pub mod mesh;

pub use mesh::{MeshData, Vertex};
