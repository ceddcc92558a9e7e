use std::f32::consts::TAU;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::backend::{Backend, BufferHandle};
use crate::error::Result;
use crate::immediate::ImmediateRenderer;

/// Per-node instance data: unit disc scaled by `radius` around `center`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct NodeInstance {
    pub center: [f32; 2],
    pub radius: f32,
    pub color: [u8; 4],
}

/// Shared disc mesh for tree nodes, stored as independent wedges
/// (centre, rim i, rim i+1) so it draws as a plain triangle list.
pub struct TreeNodeGeometry {
    backend: Arc<dyn Backend>,
    segments: u32,
    vertices: Vec<[f32; 2]>,
    buffer: BufferHandle,
}

impl TreeNodeGeometry {
    pub(crate) fn new(backend: Arc<dyn Backend>, segments: u32) -> Result<Self> {
        let segments = if segments < 3 {
            log::warn!("tree node: {segments} segments is not a disc, using 3");
            3
        } else {
            segments
        };
        let vertices = disc(segments);
        let buffer = backend.create_buffer("tree node disc", bytemuck::cast_slice(&vertices))?;
        Ok(Self {
            backend,
            segments,
            vertices,
            buffer,
        })
    }

    pub fn segments(&self) -> u32 {
        self.segments
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[[f32; 2]] {
        &self.vertices
    }

    pub(crate) fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Draws one disc per instance with the renderer's current transform.
    pub fn draw(&self, renderer: &ImmediateRenderer, instances: &[NodeInstance]) {
        renderer.draw_tree_nodes(self, instances);
    }
}

impl Drop for TreeNodeGeometry {
    fn drop(&mut self) {
        self.backend.release_buffer(self.buffer);
    }
}

fn disc(segments: u32) -> Vec<[f32; 2]> {
    let rim = |i: u32| {
        let a = TAU * i as f32 / segments as f32;
        [a.cos(), a.sin()]
    };
    (0..segments)
        .flat_map(|i| [[0.0, 0.0], rim(i), rim(i + 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn disc_is_pre_expanded_wedges() {
        let v = disc(4);
        assert_eq!(v.len(), 12);
        for wedge in v.chunks(3) {
            assert_eq!(wedge[0], [0.0, 0.0]);
        }
        // Consecutive wedges share a rim vertex.
        assert_eq!(v[2], v[4]);
        let last = v[11];
        assert!((last[0] - 1.0).abs() < 1e-5 && last[1].abs() < 1e-5);
    }

    #[test]
    fn owns_one_buffer() {
        let backend = Arc::new(NullBackend::default());
        let node = TreeNodeGeometry::new(backend.clone(), 2).unwrap();
        assert_eq!(node.segments(), 3);
        assert_eq!(node.vertex_count(), 9);
        assert_eq!(backend.live_buffers(), 1);
        drop(node);
        assert_eq!(backend.live_buffers(), 0);
    }
}
