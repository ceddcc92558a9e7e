//! Wide, smoothed and stippled lines as screen-space extruded quads.
//!
//! Every segment becomes two triangles. The vertex shader pushes each
//! vertex `side * width / 2` pixels along the segment normal, so width is
//! constant on screen whatever the model scale. `distance` runs from 0 at
//! the first endpoint to the segment's pixel length at the second and
//! drives the dash pattern in the fragment stage.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::backend::{Backend, DrawCall, DrawUniforms, FillMode, Topology, VertexSource};
use crate::geometry::ChunkPlan;
use crate::pipeline::{NamedPipeline, PipelineStateCache};

pub const VERTICES_PER_SEGMENT: usize = 6;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    /// +1 or -1: which long edge of the quad this vertex sits on.
    pub side: f32,
    /// Segment direction in model space (second endpoint minus first).
    pub tangent: [f32; 3],
    /// Pixels from the segment start.
    pub distance: f32,
    pub color: [u8; 4],
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineStipple {
    pub factor: i32,
    pub pattern: u16,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineStyle {
    pub width: f32,
    pub smooth: bool,
    pub stipple: Option<LineStipple>,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            smooth: false,
            stipple: None,
        }
    }
}

impl LineStyle {
    /// Stipple wins over smoothing; the two are never combined.
    pub fn pipeline(&self) -> NamedPipeline {
        if self.stipple.is_some() {
            NamedPipeline::LineStipple
        } else if self.smooth {
            NamedPipeline::LineSmooth
        } else {
            NamedPipeline::Line
        }
    }
}

/// Expands endpoint pairs into extruded quads and draws them in
/// budget-sized chunks.
#[derive(Debug, Clone)]
pub struct LineBatchRenderer {
    feather: f32,
}

impl LineBatchRenderer {
    pub fn new(feather: f32) -> Self {
        Self {
            feather: feather.max(0.0),
        }
    }

    pub fn feather(&self) -> f32 {
        self.feather
    }

    /// Six vertices per segment; a trailing unpaired endpoint is ignored.
    /// `to_pixels` maps model space to window pixels.
    pub fn expand(
        positions: &[[f32; 3]],
        color_at: impl Fn(usize) -> [u8; 4],
        to_pixels: Mat4,
    ) -> Vec<LineVertex> {
        let pixel = |p: [f32; 3]| {
            let v = to_pixels * Vec4::new(p[0], p[1], p[2], 1.0);
            let w = if v.w == 0.0 { 1.0 } else { v.w };
            v.truncate().truncate() / w
        };

        let mut out = Vec::with_capacity(positions.len() / 2 * VERTICES_PER_SEGMENT);
        for (s, pair) in positions.chunks_exact(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let tangent = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let length = pixel(a).distance(pixel(b));
            let (ca, cb) = (color_at(2 * s), color_at(2 * s + 1));

            let v = |position: [f32; 3], side: f32, distance: f32, color: [u8; 4]| LineVertex {
                position,
                side,
                tangent,
                distance,
                color,
            };
            let a_pos = v(a, 1.0, 0.0, ca);
            let a_neg = v(a, -1.0, 0.0, ca);
            let b_pos = v(b, 1.0, length, cb);
            let b_neg = v(b, -1.0, length, cb);
            out.extend_from_slice(&[a_pos, a_neg, b_pos, b_pos, a_neg, b_neg]);
        }
        out
    }

    /// Returns the number of draws issued.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        backend: &dyn Backend,
        cache: &PipelineStateCache,
        style: LineStyle,
        uniforms: DrawUniforms,
        positions: &[[f32; 3]],
        color_at: impl Fn(usize) -> [u8; 4],
        to_pixels: Mat4,
        depth_test: bool,
    ) -> usize {
        let pipeline_kind = style.pipeline();
        let Some(pipeline) = cache.named(pipeline_kind) else {
            log::error!("line batch: {pipeline_kind:?} pipeline not built");
            return 0;
        };
        if positions.len() % 2 != 0 {
            log::debug!("line batch: dropping unpaired endpoint");
        }

        let vertices = Self::expand(positions, color_at, to_pixels);
        let uniforms = self.uniforms(uniforms, style);

        let segment_size = std::mem::size_of::<LineVertex>() * VERTICES_PER_SEGMENT;
        let plan = ChunkPlan::new(
            Topology::PointList,
            segment_size,
            backend.caps().transfer_budget,
        );

        let segments = vertices.len() / VERTICES_PER_SEGMENT;
        let mut draws = 0;
        for range in plan.ranges(segments) {
            let slice =
                &vertices[range.start * VERTICES_PER_SEGMENT..range.end * VERTICES_PER_SEGMENT];
            backend.draw(&DrawCall {
                pipeline,
                topology: Topology::TriangleList,
                uniforms,
                streams: vec![VertexSource::Bytes(bytemuck::cast_slice(slice))],
                vertex_count: slice.len() as u32,
                instance_count: 1,
                texture: None,
                fill: FillMode::Fill,
                depth_test,
            });
            draws += 1;
        }
        draws
    }

    fn uniforms(&self, mut uniforms: DrawUniforms, style: LineStyle) -> DrawUniforms {
        uniforms.params[2] = style.width;
        uniforms.stipple = [0.0; 4];
        if let Some(stipple) = style.stipple {
            uniforms.params[3] = stipple.factor.max(1) as f32;
            uniforms.stipple[0] = stipple.pattern as f32;
        }
        if style.smooth && style.stipple.is_none() {
            uniforms.stipple[1] = self.feather;
        }
        uniforms
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{NullBackend, NullBackendConfig, PixelFormat};

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn setup(config: NullBackendConfig) -> (Arc<NullBackend>, PipelineStateCache) {
        let backend = Arc::new(NullBackend::new(config));
        let cache = PipelineStateCache::new(backend.clone());
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        (backend, cache)
    }

    // ── expansion ─────────────────────────────────────────────────────────

    #[test]
    fn vertex_is_36_bytes() {
        assert_eq!(std::mem::size_of::<LineVertex>(), 36);
    }

    #[test]
    fn one_segment_is_six_vertices() {
        let v = LineBatchRenderer::expand(&[[0.0; 3], [10.0, 0.0, 0.0]], |_| RED, Mat4::IDENTITY);
        assert_eq!(v.len(), 6);
        let sides: Vec<f32> = v.iter().map(|v| v.side).collect();
        assert_eq!(sides, vec![1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
        assert!(v.iter().all(|v| v.tangent == [10.0, 0.0, 0.0]));
        assert_eq!(v[0].distance, 0.0);
        assert_eq!(v[5].distance, 10.0);
    }

    #[test]
    fn distance_is_measured_in_pixels() {
        let to_pixels = Mat4::from_scale(glam::Vec3::new(4.0, 4.0, 1.0));
        let v = LineBatchRenderer::expand(&[[0.0; 3], [0.0, 2.0, 0.0]], |_| RED, to_pixels);
        assert_eq!(v[2].distance, 8.0);
    }

    #[test]
    fn colors_follow_endpoints() {
        let colors = [[1, 1, 1, 1], [2, 2, 2, 2]];
        let v = LineBatchRenderer::expand(&[[0.0; 3], [1.0; 3]], |i| colors[i], Mat4::IDENTITY);
        assert_eq!(v[0].color, colors[0]);
        assert_eq!(v[4].color, colors[0]);
        assert_eq!(v[3].color, colors[1]);
        assert_eq!(v[5].color, colors[1]);
    }

    // ── drawing ───────────────────────────────────────────────────────────

    #[test]
    fn style_selects_pipeline() {
        let stipple = Some(LineStipple { factor: 1, pattern: 0xF0F0 });
        let smooth_and_stippled = LineStyle { smooth: true, stipple, ..Default::default() };
        assert_eq!(smooth_and_stippled.pipeline(), NamedPipeline::LineStipple);
        let smooth = LineStyle { smooth: true, ..Default::default() };
        assert_eq!(smooth.pipeline(), NamedPipeline::LineSmooth);
        assert_eq!(LineStyle::default().pipeline(), NamedPipeline::Line);
    }

    #[test]
    fn segments_chunk_by_budget() {
        let (backend, cache) = setup(NullBackendConfig::default());
        let renderer = LineBatchRenderer::new(1.0);
        // 4096 / (36 * 6) = 18 segments per draw.
        let positions = vec![[0.0, 0.0, 0.0]; 40 * 2];
        let draws = renderer.render(
            backend.as_ref(),
            &cache,
            LineStyle::default(),
            DrawUniforms::default(),
            &positions,
            |_| RED,
            Mat4::IDENTITY,
            false,
        );
        assert_eq!(draws, 3);
        let counts: Vec<u32> = backend.draws().iter().map(|d| d.vertex_count).collect();
        assert_eq!(counts, vec![108, 108, 24]);
    }

    #[test]
    fn stipple_uniforms_are_set() {
        let (backend, cache) = setup(NullBackendConfig::default());
        let renderer = LineBatchRenderer::new(1.5);
        let style = LineStyle {
            width: 3.0,
            smooth: true,
            stipple: Some(LineStipple { factor: 2, pattern: 0x00FF }),
        };
        renderer.render(
            backend.as_ref(),
            &cache,
            style,
            DrawUniforms::default(),
            &[[0.0; 3], [1.0, 0.0, 0.0]],
            |_| RED,
            Mat4::IDENTITY,
            false,
        );
        let draws = backend.draws();
        let draw = &draws[0];
        assert_eq!(draw.uniforms.params[2..], [3.0, 2.0]);
        assert_eq!(draw.uniforms.stipple[..2], [255.0, 0.0]);
        assert_eq!(draw.label, "line stipple");
    }
}
