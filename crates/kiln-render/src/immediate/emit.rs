//! Turning recorded geometry into backend draws.
//!
//! Primitives a backend cannot draw natively are rewritten through index
//! lists: quads and fans become triangle lists, line-mode polygons become
//! their triangle edges. Gathering by index always works on the CPU copy of
//! a stream, so rewritten batches never bind uploaded buffers.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};

use crate::backend::{AttrFormat, BackendCaps, BufferHandle, Topology, VertexSource};
use crate::geometry::{DrawMode, GeometryBuffer};
use crate::pipeline::PipelineCategory;

/// Interleaved vertex of the stippled polygon pipeline.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PolygonVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

#[derive(Debug, Clone)]
pub(crate) struct StreamData<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub buffer: Option<BufferHandle>,
    pub stride: usize,
}

impl<'a> StreamData<'a> {
    pub fn source(&self, start: usize, end: usize) -> VertexSource<'_> {
        match self.buffer {
            Some(handle) => VertexSource::Buffer {
                handle,
                offset: (start * self.stride) as u64,
            },
            None => VertexSource::Bytes(
                self.bytes
                    .get(start * self.stride..end * self.stride)
                    .unwrap_or_default(),
            ),
        }
    }

    fn gather(&self, indices: &[u32]) -> StreamData<'a> {
        let mut out = Vec::with_capacity(indices.len() * self.stride);
        for &i in indices {
            let at = i as usize * self.stride;
            if let Some(v) = self.bytes.get(at..at + self.stride) {
                out.extend_from_slice(v);
            }
        }
        StreamData {
            bytes: Cow::Owned(out),
            buffer: None,
            stride: self.stride,
        }
    }
}

/// Vertex streams ready for one logical draw.
#[derive(Debug, Clone)]
pub(crate) struct Batch<'a> {
    pub mode: DrawMode,
    pub category: PipelineCategory,
    pub vertex_count: usize,
    /// One entry per stream of `category.layout()`.
    pub streams: Vec<StreamData<'a>>,
    /// The fan was expanded into a triangle list while recording.
    pub fan_expanded: bool,
}

impl<'a> Batch<'a> {
    pub fn from_geometry(geom: &'a GeometryBuffer) -> Option<Self> {
        let Some(category) = geom.category() else {
            log::error!(
                "{}: no pipeline for {:?} vertices with {:?}",
                geom.label(),
                geom.vertex_format(),
                geom.secondary_format()
            );
            return None;
        };

        let mut streams = vec![StreamData {
            bytes: Cow::Borrowed(geom.vertex_bytes()),
            buffer: geom.gpu_vertices(),
            stride: geom.vertex_format().stride(),
        }];
        if geom.secondary_count() > 0 {
            streams.push(StreamData {
                bytes: Cow::Borrowed(geom.secondary_bytes()),
                buffer: geom.gpu_secondary(),
                stride: geom.secondary_format().stride(),
            });
        }

        Some(Self {
            mode: geom.mode(),
            category,
            vertex_count: geom.vertex_count(),
            streams,
            fan_expanded: false,
        })
    }

    pub fn gather(&self, indices: &[u32]) -> Batch<'a> {
        Batch {
            mode: self.mode,
            category: self.category,
            vertex_count: indices.len(),
            streams: self.streams.iter().map(|s| s.gather(indices)).collect(),
            fan_expanded: self.fan_expanded,
        }
    }

    /// Drops the texture coordinate stream, for textured categories drawn
    /// while texturing is off.
    pub fn untextured(mut self) -> Self {
        self.category = match self.category {
            PipelineCategory::Texture | PipelineCategory::TextureAlpha => PipelineCategory::Plain,
            PipelineCategory::Texture1D => PipelineCategory::Plain2D,
            _ => return self,
        };
        self.streams.truncate(1);
        self
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        let Some(stream) = self.streams.first() else {
            return Vec::new();
        };
        stream
            .bytes
            .chunks_exact(stream.stride.max(1))
            .filter_map(|c| match c.len() {
                8 => {
                    let [x, y]: [f32; 2] = bytemuck::pod_read_unaligned(c);
                    Some([x, y, 0.0])
                }
                n if n >= 12 => Some(bytemuck::pod_read_unaligned(&c[..12])),
                _ => None,
            })
            .take(self.vertex_count)
            .collect()
    }

    /// Per-vertex color when the category carries one.
    pub fn color(&self, i: usize) -> Option<[f32; 4]> {
        let layout = self.category.layout().streams();
        let attr = layout.get(1)?.attributes.iter().find(|a| a.location == 1)?;
        let stream = self.streams.get(1)?;
        let at = i * stream.stride + attr.offset as usize;
        match attr.format {
            AttrFormat::Float32x4 => {
                Some(bytemuck::pod_read_unaligned(stream.bytes.get(at..at + 16)?))
            }
            AttrFormat::Unorm8x4 => {
                let b = stream.bytes.get(at..at + 4)?;
                Some([b[0], b[1], b[2], b[3]].map(|c| c as f32 / 255.0))
            }
            _ => None,
        }
    }
}

/// Topology the backend receives for a mode, plus the index list that
/// rewrites the recorded vertices when the mode is emulated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assembly {
    pub topology: Topology,
    pub indices: Option<Vec<u32>>,
}

pub(crate) fn assemble(
    mode: DrawMode,
    count: usize,
    caps: BackendCaps,
    fan_expanded: bool,
) -> Assembly {
    let native = |topology| Assembly {
        topology,
        indices: None,
    };
    match mode {
        DrawMode::Points => native(Topology::PointList),
        DrawMode::Lines => native(Topology::LineList),
        DrawMode::LineStrip => native(Topology::LineStrip),
        DrawMode::LineLoop => Assembly {
            topology: Topology::LineStrip,
            indices: (count > 0).then(|| (0..count as u32).chain([0]).collect()),
        },
        DrawMode::Triangles => native(Topology::TriangleList),
        DrawMode::TriangleStrip => native(Topology::TriangleStrip),
        DrawMode::TriangleFan if fan_expanded => native(Topology::TriangleList),
        DrawMode::TriangleFan if caps.native_fans => native(Topology::TriangleFan),
        DrawMode::TriangleFan => Assembly {
            topology: Topology::TriangleList,
            indices: Some(triangle_indices(Topology::TriangleFan, count)),
        },
        DrawMode::Quads if caps.native_quads => native(Topology::Quads),
        DrawMode::Quads => Assembly {
            topology: Topology::TriangleList,
            indices: Some(triangle_indices(Topology::Quads, count)),
        },
    }
}

pub(crate) fn is_filled(topology: Topology) -> bool {
    matches!(
        topology,
        Topology::TriangleList | Topology::TriangleStrip | Topology::TriangleFan | Topology::Quads
    )
}

/// Independent triangles covering `count` vertices drawn as `topology`.
pub(crate) fn triangle_indices(topology: Topology, count: usize) -> Vec<u32> {
    let n = count as u32;
    match topology {
        Topology::TriangleList => (0..n / 3 * 3).collect(),
        Topology::TriangleStrip => (0..n.saturating_sub(2))
            .flat_map(|i| {
                if i % 2 == 0 {
                    [i, i + 1, i + 2]
                } else {
                    [i + 1, i, i + 2]
                }
            })
            .collect(),
        Topology::TriangleFan => (1..n.saturating_sub(1))
            .flat_map(|i| [0, i, i + 1])
            .collect(),
        Topology::Quads => (0..n / 4)
            .flat_map(|q| {
                let a = q * 4;
                [a, a + 1, a + 2, a, a + 2, a + 3]
            })
            .collect(),
        Topology::PointList | Topology::LineList | Topology::LineStrip => Vec::new(),
    }
}

/// Line list outlining every triangle.
pub(crate) fn edge_indices(triangles: &[u32]) -> Vec<u32> {
    triangles
        .chunks_exact(3)
        .flat_map(|t| [t[0], t[1], t[1], t[2], t[2], t[0]])
        .collect()
}

/// Applies `inner` (indices into the output of `outer`) on top of `outer`.
pub(crate) fn compose(outer: Option<Vec<u32>>, inner: Vec<u32>) -> Vec<u32> {
    match outer {
        None => inner,
        Some(outer) => inner
            .into_iter()
            .filter_map(|i| outer.get(i as usize).copied())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: BackendCaps = BackendCaps::legacy();
    const MODERN: BackendCaps = BackendCaps::command_buffer(4096);

    // ── assembly ──────────────────────────────────────────────────────────

    #[test]
    fn quads_split_into_two_triangles() {
        let a = assemble(DrawMode::Quads, 8, MODERN, false);
        assert_eq!(a.topology, Topology::TriangleList);
        assert_eq!(
            a.indices.unwrap(),
            vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]
        );
        assert_eq!(assemble(DrawMode::Quads, 8, LEGACY, false).topology, Topology::Quads);
    }

    #[test]
    fn fans_use_the_cheapest_path() {
        assert_eq!(
            assemble(DrawMode::TriangleFan, 9, MODERN, true),
            Assembly {
                topology: Topology::TriangleList,
                indices: None
            }
        );
        assert_eq!(
            assemble(DrawMode::TriangleFan, 5, LEGACY, false).topology,
            Topology::TriangleFan
        );
        let a = assemble(DrawMode::TriangleFan, 5, MODERN, false);
        assert_eq!(a.indices.unwrap(), vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn line_loop_returns_to_start() {
        let a = assemble(DrawMode::LineLoop, 3, MODERN, false);
        assert_eq!(a.topology, Topology::LineStrip);
        assert_eq!(a.indices.unwrap(), vec![0, 1, 2, 0]);
    }

    // ── index rewriting ───────────────────────────────────────────────────

    #[test]
    fn strip_triangles_keep_winding() {
        assert_eq!(
            triangle_indices(Topology::TriangleStrip, 5),
            vec![0, 1, 2, 2, 1, 3, 2, 3, 4]
        );
    }

    #[test]
    fn edges_outline_each_triangle() {
        assert_eq!(edge_indices(&[0, 1, 2]), vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn compose_follows_outer_indices() {
        let quads = triangle_indices(Topology::Quads, 4);
        let tris = triangle_indices(Topology::TriangleList, quads.len());
        let edges = compose(Some(quads), edge_indices(&tris));
        assert_eq!(edges, vec![0, 1, 1, 2, 2, 0, 0, 2, 2, 3, 3, 0]);
    }

    #[test]
    fn polygon_vertex_is_28_bytes() {
        assert_eq!(std::mem::size_of::<PolygonVertex>(), 28);
    }
}
