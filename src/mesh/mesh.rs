//! Triangle mesh produced by isosurface extraction

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::math::Aabb;

/// GPU-ready vertex. `color` carries up to four material weights.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [u8; 4],
}

impl Vertex {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    /// Material weights as floats in `[0, 1]`
    pub fn material_weights(&self) -> [f32; 4] {
        self.color.map(|c| c as f32 / 255.0)
    }
}

/// Vertex + index buffers with chunk-local bounds.
///
/// Rebuilt wholesale on every remesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.bounds = Aabb::default();
    }

    /// Recompute `bounds` from vertex positions (zero box when empty)
    pub fn update_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.vertices.iter().map(Vertex::position)).unwrap_or_default();
    }

    /// Raw vertex bytes for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for upload
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
