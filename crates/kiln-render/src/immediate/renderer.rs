use std::sync::Arc;

use glam::{DMat4, DVec3, Mat4};

use super::emit::{
    Assembly, Batch, PolygonVertex, assemble, compose, edge_indices, is_filled, triangle_indices,
};
use super::state::{
    BlendFactor, BoundTexture, Capability, HintMode, HintTarget, PolygonMode, RenderState,
    ShadeModel, TexEnvMode, TexEnvName, TexEnvTarget,
};
use super::stream::PendingStream;
use crate::backend::{
    Api, Backend, DrawCall, DrawUniforms, FillMode, ScissorRect, Topology, VertexSource,
};
use crate::color::Rgba;
use crate::config::RenderConfig;
use crate::error::Result;
use crate::geometry::{ChunkPlan, DrawMode, GeometryBuffer, NodeInstance, TreeNodeGeometry};
use crate::lines::{LineBatchRenderer, LineStipple};
use crate::math::{self, MatrixMode};
use crate::pipeline::{NamedPipeline, PipelineQuery, PipelineStateCache};

/// One immediate-mode drawing context.
///
/// Owns the matrix stacks and render state. Vertices recorded between
/// [`begin`](Self::begin) and [`end`](Self::end) are flushed at `end`; every
/// other draw entry point flushes immediately. Draws need a bound target:
/// without one they log at trace level and do nothing.
pub struct ImmediateRenderer {
    backend: Arc<dyn Backend>,
    cache: Arc<PipelineStateCache>,
    lines: LineBatchRenderer,
    state: RenderState,
    pending: Option<PendingStream>,
    /// Geometry of the most recent `end`.
    scratch: GeometryBuffer,
}

impl ImmediateRenderer {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<PipelineStateCache>,
        config: &RenderConfig,
    ) -> Self {
        let scratch = GeometryBuffer::new(backend.clone(), "immediate scratch", DrawMode::Points);
        Self {
            backend,
            cache,
            lines: LineBatchRenderer::new(config.line_feather),
            state: RenderState::default(),
            pending: None,
            scratch,
        }
    }

    pub fn api(&self) -> Api {
        self.backend.api()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<PipelineStateCache> {
        &self.cache
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// The geometry flushed by the last `end`.
    pub fn scratch(&self) -> &GeometryBuffer {
        &self.scratch
    }

    pub fn is_recording(&self) -> bool {
        self.pending.is_some()
    }

    // ── begin / end ───────────────────────────────────────────────────────

    pub fn begin(&mut self, mode: DrawMode) {
        if let Some(open) = self.pending.as_ref() {
            log::error!(
                "begin({mode:?}) inside begin({:?}); discarding {} vertices",
                open.mode,
                open.vertex_count()
            );
        }
        self.pending = Some(PendingStream::new(mode));
    }

    pub fn end(&mut self) {
        let Some(mut stream) = self.pending.take() else {
            log::error!("end without a matching begin");
            return;
        };
        if stream.vertex_count() == 0 {
            log::debug!("end({:?}) with no vertices", stream.mode);
            return;
        }

        if stream.mode == DrawMode::LineLoop {
            stream.close_loop();
        }
        stream.finish();
        self.fill_scratch(&stream);

        if stream.mode == DrawMode::Lines {
            let current = self.state.current_color.to_u8();
            let colors = &stream.colors;
            self.draw_lines(&stream.positions, |i| {
                colors.get(i).map_or(current, |c| Rgba::from(*c).to_u8())
            });
            return;
        }

        let Some(mut batch) = Batch::from_geometry(&self.scratch) else {
            return;
        };
        batch.fan_expanded =
            stream.mode == DrawMode::TriangleFan && !self.backend.caps().native_fans;
        if batch.mode == DrawMode::LineLoop {
            batch.mode = DrawMode::LineStrip;
        }
        self.emit(batch, self.uniforms());
    }

    fn fill_scratch(&mut self, stream: &PendingStream) {
        let scratch = &mut self.scratch;
        scratch.clear();
        scratch.set_mode(stream.mode);
        scratch.set_vertices_3d(&stream.positions);

        // One secondary stream: color wins over texture coordinates.
        let stored = if !stream.colors.is_empty() {
            scratch.set_colors(&stream.colors)
        } else if !stream.tex_coords.is_empty() {
            scratch.set_tex_coords_2d(&stream.tex_coords)
        } else {
            Ok(())
        };
        if let Err(e) = stored {
            log::error!("immediate stream: {e}");
        }
    }

    // ── vertices and attributes ───────────────────────────────────────────

    pub fn vertex2f(&mut self, x: f32, y: f32) {
        self.push_vertex([x, y, 0.0]);
    }

    pub fn vertex2d(&mut self, x: f64, y: f64) {
        self.push_vertex([x as f32, y as f32, 0.0]);
    }

    pub fn vertex3f(&mut self, x: f32, y: f32, z: f32) {
        self.push_vertex([x, y, z]);
    }

    pub fn vertex3d(&mut self, x: f64, y: f64, z: f64) {
        self.push_vertex([x as f32, y as f32, z as f32]);
    }

    fn push_vertex(&mut self, position: [f32; 3]) {
        let expand_fan = !self.backend.caps().native_fans;
        match self.pending.as_mut() {
            Some(stream) => stream.push_vertex(position, expand_fan),
            None => log::error!("vertex outside begin/end"),
        }
    }

    pub fn color3f(&mut self, r: f32, g: f32, b: f32) {
        self.set_color(Rgba::new(r, g, b, 1.0));
    }

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.set_color(Rgba::new(r, g, b, a));
    }

    pub fn color3d(&mut self, r: f64, g: f64, b: f64) {
        self.set_color(Rgba::from_f64(r, g, b, 1.0));
    }

    pub fn color4d(&mut self, r: f64, g: f64, b: f64, a: f64) {
        self.set_color(Rgba::from_f64(r, g, b, a));
    }

    pub fn color3ub(&mut self, r: u8, g: u8, b: u8) {
        self.set_color(Rgba::from_u8(r, g, b, 255));
    }

    pub fn color4ub(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.set_color(Rgba::from_u8(r, g, b, a));
    }

    /// Sets the current color; inside begin/end it also colors the next vertex.
    fn set_color(&mut self, color: Rgba) {
        let prior = std::mem::replace(&mut self.state.current_color, color);
        if let Some(stream) = self.pending.as_mut() {
            stream.push_color(color.to_array(), prior.to_array());
        }
    }

    /// 1D coordinates sample the middle row of a height-1 texture.
    pub fn tex_coord1f(&mut self, s: f32) {
        self.tex_coord2f(s, 0.5);
    }

    pub fn tex_coord2f(&mut self, s: f32, t: f32) {
        match self.pending.as_mut() {
            Some(stream) => stream.push_tex_coord([s, t]),
            None => log::trace!("tex_coord outside begin/end ignored"),
        }
    }

    // ── matrices ──────────────────────────────────────────────────────────

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.state.matrix_mode = mode;
    }

    pub fn push_matrix(&mut self) {
        self.state.stack_mut().push();
    }

    /// Never removes the last matrix.
    pub fn pop_matrix(&mut self) {
        self.state.stack_mut().pop();
    }

    pub fn load_identity(&mut self) {
        self.state.stack_mut().load_identity();
    }

    /// Column-major, like every matrix array in this API.
    pub fn load_matrixf(&mut self, m: &[f32; 16]) {
        self.load_matrixd(&m.map(f64::from));
    }

    pub fn load_matrixd(&mut self, m: &[f64; 16]) {
        self.state.stack_mut().load(DMat4::from_cols_array(m));
    }

    pub fn mult_matrixf(&mut self, m: &[f32; 16]) {
        self.mult_matrixd(&m.map(f64::from));
    }

    pub fn mult_matrixd(&mut self, m: &[f64; 16]) {
        self.state.stack_mut().mult(DMat4::from_cols_array(m));
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        self.translated(x.into(), y.into(), z.into());
    }

    pub fn translated(&mut self, x: f64, y: f64, z: f64) {
        self.state
            .stack_mut()
            .mult(DMat4::from_translation(DVec3::new(x, y, z)));
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        self.scaled(x.into(), y.into(), z.into());
    }

    pub fn scaled(&mut self, x: f64, y: f64, z: f64) {
        self.state
            .stack_mut()
            .mult(DMat4::from_scale(DVec3::new(x, y, z)));
    }

    pub fn rotatef(&mut self, angle_deg: f32, x: f32, y: f32, z: f32) {
        self.rotated(angle_deg.into(), x.into(), y.into(), z.into());
    }

    /// A zero-length axis leaves the matrix unchanged.
    pub fn rotated(&mut self, angle_deg: f64, x: f64, y: f64, z: f64) {
        match math::rotation(angle_deg, x, y, z) {
            Some(r) => self.state.stack_mut().mult(r),
            None => log::trace!("rotate about a zero axis ignored"),
        }
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.state
            .stack_mut()
            .mult(math::ortho(left, right, bottom, top, near, far));
    }

    pub fn model_view_matrix(&self) -> DMat4 {
        self.state.model_view.top()
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.state.projection.top()
    }

    // ── state ─────────────────────────────────────────────────────────────

    pub fn enable(&mut self, cap: Capability) {
        self.set_capability(cap, true);
    }

    pub fn disable(&mut self, cap: Capability) {
        self.set_capability(cap, false);
    }

    pub fn is_enabled(&self, cap: Capability) -> bool {
        self.state.is_enabled(cap)
    }

    fn set_capability(&mut self, cap: Capability, on: bool) {
        self.state.set_flag(cap, on);
        if cap != Capability::ScissorTest {
            return;
        }
        if on {
            self.apply_scissor();
        } else {
            self.state.scissor = self.state.full_scissor();
            if self.backend.has_target() {
                self.backend.set_scissor(None);
            }
        }
    }

    pub fn line_width(&mut self, width: f32) {
        if width > 0.0 {
            self.state.line_width = width;
        } else {
            log::error!("line_width({width}) ignored");
        }
    }

    pub fn point_size(&mut self, size: f32) {
        if size > 0.0 {
            self.state.point_size = size;
        } else {
            log::error!("point_size({size}) ignored");
        }
    }

    /// `factor` is clamped to 1..=256.
    pub fn line_stipple(&mut self, factor: i32, pattern: u16) {
        self.state.line_stipple = LineStipple {
            factor: factor.clamp(1, 256),
            pattern,
        };
    }

    pub fn polygon_stipple(&mut self, mask: &[u8; 128]) {
        self.state.polygon_stipple = *mask;
    }

    pub fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        match BlendFactor::blend_mode(src, dst) {
            Some(mode) => self.state.blend_mode = mode,
            None => log::error!("blend_func({src:?}, {dst:?}) is not implemented"),
        }
    }

    pub fn tex_envi(&mut self, target: TexEnvTarget, name: TexEnvName, mode: TexEnvMode) {
        match (target, name) {
            (TexEnvTarget::TextureEnv, TexEnvName::Mode) => {
                self.state.tex_modulate = mode == TexEnvMode::Modulate;
            }
            _ => log::error!("tex_envi({target:?}, {name:?}, {mode:?}) is not implemented"),
        }
    }

    pub fn polygon_mode(&mut self, mode: PolygonMode) {
        self.state.fill_mode = match mode {
            PolygonMode::Fill => FillMode::Fill,
            PolygonMode::Line => FillMode::Line,
            PolygonMode::Point => {
                log::error!("polygon_mode(Point) is not implemented");
                return;
            }
        };
    }

    /// Bottom-left origin, like `viewport`. The box is clipped to the client
    /// rectangle before it is flipped.
    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let (cw, ch) = (
            i64::from(self.state.client_size.0),
            i64::from(self.state.client_size.1),
        );
        let (x, y) = (i64::from(x), i64::from(y));
        let x0 = x.clamp(0, cw);
        let x1 = (x + i64::from(width.max(0))).clamp(0, cw);
        let y0 = y.clamp(0, ch);
        let y1 = (y + i64::from(height.max(0))).clamp(0, ch);
        self.state.scissor = ScissorRect {
            x: x0 as u32,
            y: (ch - y1) as u32,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        };
        self.apply_scissor();
    }

    /// Scissor test flag and rectangle.
    pub(crate) fn scissor_state(&self) -> (bool, ScissorRect) {
        (self.state.scissor_enabled, self.state.scissor)
    }

    pub(crate) fn restore_scissor(&mut self, (enabled, rect): (bool, ScissorRect)) {
        self.state.scissor_enabled = enabled;
        self.state.scissor = rect;
        if self.backend.has_target() {
            self.backend.set_scissor(enabled.then_some(rect));
        }
    }

    fn apply_scissor(&self) {
        if self.state.scissor_enabled && self.backend.has_target() {
            self.backend.set_scissor(Some(self.state.scissor));
        }
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.state.viewport = [x.into(), y.into(), width.max(0).into(), height.max(0).into()];
    }

    pub fn viewport_rect(&self) -> [f64; 4] {
        self.state.viewport
    }

    /// Device coordinates to window pixels for the current viewport.
    pub fn window_matrix(&self) -> DMat4 {
        let [x, y, w, h] = self.state.viewport;
        math::window_matrix(x, y, w, h)
    }

    /// Window pixels back to device coordinates.
    pub fn window_projection(&self) -> DMat4 {
        let [x, y, w, h] = self.state.viewport;
        math::window_projection(x, y, w, h)
    }

    pub(crate) fn set_viewport_rect(&mut self, rect: [f64; 4]) {
        self.state.viewport = rect;
    }

    /// Logical size of the current target. Also resets an unset viewport.
    pub fn set_client_size(&mut self, width: u32, height: u32) {
        self.state.client_size = (width, height);
        if self.state.viewport[2] == 0.0 || self.state.viewport[3] == 0.0 {
            self.state.viewport = [0.0, 0.0, width.into(), height.into()];
        }
    }

    pub fn client_size(&self) -> (u32, u32) {
        self.state.client_size
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.state.clear_color = Rgba::new(r, g, b, a);
    }

    pub fn clear(&self, color: bool, depth: bool) {
        if !self.backend.has_target() {
            log::trace!("clear without a target");
            return;
        }
        self.backend
            .clear(color.then(|| self.state.clear_color.to_array()), depth);
    }

    pub fn bind_texture(&mut self, texture: Option<BoundTexture>) {
        self.state.bound_texture = texture;
    }

    pub fn color_mask(&mut self, _r: bool, _g: bool, _b: bool, _a: bool) {}

    pub fn hint(&mut self, _target: HintTarget, _mode: HintMode) {}

    pub fn shade_model(&mut self, _model: ShadeModel) {}

    pub fn push_attrib(&mut self) {}

    pub fn pop_attrib(&mut self) {}

    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    // ── drawing ───────────────────────────────────────────────────────────

    /// Draws a buffer with the current state. `Lines` buffers go through the
    /// line batcher like immediate lines do.
    pub fn draw_geometry(&self, geom: &GeometryBuffer) {
        if geom.is_empty() {
            return;
        }
        let Some(batch) = Batch::from_geometry(geom) else {
            return;
        };
        if batch.mode == DrawMode::Lines {
            let current = self.state.current_color.to_u8();
            let positions = batch.positions();
            self.draw_lines(&positions, |i| {
                batch.color(i).map_or(current, |c| Rgba::from(c).to_u8())
            });
        } else {
            self.emit(batch, self.uniforms());
        }
    }

    pub(crate) fn draw_narrow_edges(&self, geom: &GeometryBuffer) {
        let Some(mut batch) = Batch::from_geometry(geom) else {
            return;
        };
        batch.mode = DrawMode::Lines;
        let mut uniforms = self.uniforms();
        uniforms.params[2] = 1.0;
        self.emit(batch, uniforms);
    }

    pub(crate) fn draw_filler_points(&self, geom: &GeometryBuffer, indices: &[u32]) {
        if indices.is_empty() {
            return;
        }
        let Some(batch) = Batch::from_geometry(geom) else {
            return;
        };
        let mut points = batch.gather(indices);
        points.mode = DrawMode::Points;
        self.emit(points, self.uniforms());
    }

    pub(crate) fn draw_tree_nodes(&self, node: &TreeNodeGeometry, instances: &[NodeInstance]) {
        if instances.is_empty() {
            return;
        }
        if !self.backend.has_target() {
            log::trace!("tree nodes without a target");
            return;
        }
        let Some(pipeline) = self.cache.named(NamedPipeline::TreeNode) else {
            log::error!("tree node pipeline not built");
            return;
        };

        let uniforms = self.uniforms();
        let plan = ChunkPlan::new(
            Topology::PointList,
            std::mem::size_of::<NodeInstance>(),
            self.backend.caps().transfer_budget,
        );
        for range in plan.ranges(instances.len()) {
            let chunk = &instances[range];
            self.backend.draw(&DrawCall {
                pipeline,
                topology: Topology::TriangleList,
                uniforms,
                streams: vec![
                    VertexSource::Buffer {
                        handle: node.buffer(),
                        offset: 0,
                    },
                    VertexSource::Bytes(bytemuck::cast_slice(chunk)),
                ],
                vertex_count: node.vertex_count() as u32,
                instance_count: chunk.len() as u32,
                texture: None,
                fill: FillMode::Fill,
                depth_test: self.state.depth_test,
            });
        }
    }

    fn draw_lines(&self, positions: &[[f32; 3]], color_at: impl Fn(usize) -> [u8; 4]) {
        if !self.backend.has_target() {
            log::trace!("lines without a target");
            return;
        }
        self.lines.render(
            self.backend.as_ref(),
            &self.cache,
            self.state.line_style(),
            self.uniforms(),
            positions,
            color_at,
            self.pixel_transform(),
            self.state.depth_test,
        );
    }

    fn emit(&self, batch: Batch<'_>, uniforms: DrawUniforms) {
        if batch.vertex_count == 0 {
            return;
        }
        if !self.backend.has_target() {
            log::trace!("{:?} draw without a target", batch.mode);
            return;
        }

        let caps = self.backend.caps();
        let Assembly {
            mut topology,
            mut indices,
        } = assemble(batch.mode, batch.vertex_count, caps, batch.fan_expanded);

        let mut fill = FillMode::Fill;
        if self.state.fill_mode == FillMode::Line && is_filled(topology) {
            if caps.native_polygon_mode {
                fill = FillMode::Line;
            } else {
                let count = indices.as_ref().map_or(batch.vertex_count, Vec::len);
                let edges = edge_indices(&triangle_indices(topology, count));
                indices = Some(compose(indices, edges));
                topology = Topology::LineList;
            }
        }

        let batch = match indices {
            Some(indices) => batch.gather(&indices),
            None => batch,
        };
        if batch.vertex_count == 0 {
            return;
        }

        if self.state.polygon_stipple_enabled && fill == FillMode::Fill && is_filled(topology) {
            self.emit_stippled(&batch, topology, uniforms);
            return;
        }

        let bound = self
            .state
            .bound_texture
            .filter(|_| self.state.texturing());
        let batch = if batch.category.is_textured() && bound.is_none() {
            batch.untextured()
        } else {
            batch
        };
        let texture = bound.filter(|_| batch.category.is_textured());

        let query = PipelineQuery {
            blend_enabled: self.state.blend_enabled,
            blend_mode: self.state.blend_mode,
            texture_alpha: texture.is_some_and(|t| t.alpha_only),
        };
        let Some(pipeline) = self.cache.get(batch.category, query) else {
            log::error!("no pipeline for {:?}", batch.category);
            return;
        };

        let plan = ChunkPlan::new(
            topology,
            batch.category.layout().element_size(),
            caps.transfer_budget,
        );
        for range in plan.ranges(batch.vertex_count) {
            self.backend.draw(&DrawCall {
                pipeline,
                topology,
                uniforms,
                streams: batch
                    .streams
                    .iter()
                    .map(|s| s.source(range.start, range.end))
                    .collect(),
                vertex_count: range.len() as u32,
                instance_count: 1,
                texture: texture.map(|t| t.handle),
                fill,
                depth_test: self.state.depth_test,
            });
        }
    }

    fn emit_stippled(&self, batch: &Batch<'_>, topology: Topology, uniforms: DrawUniforms) {
        let Some(pipeline) = self.cache.named(NamedPipeline::StippledPolygon) else {
            log::error!("stippled polygon pipeline not built");
            return;
        };

        let current = self.state.current_color.to_array();
        let vertices: Vec<PolygonVertex> = batch
            .positions()
            .into_iter()
            .enumerate()
            .map(|(i, position)| PolygonVertex {
                position,
                color: batch.color(i).unwrap_or(current),
            })
            .collect();

        let plan = ChunkPlan::new(
            topology,
            std::mem::size_of::<PolygonVertex>(),
            self.backend.caps().transfer_budget,
        );
        for range in plan.ranges(vertices.len()) {
            let chunk = &vertices[range];
            self.backend.draw(&DrawCall {
                pipeline,
                topology,
                uniforms,
                streams: vec![VertexSource::Bytes(bytemuck::cast_slice(chunk))],
                vertex_count: chunk.len() as u32,
                instance_count: 1,
                texture: None,
                fill: FillMode::Fill,
                depth_test: self.state.depth_test,
            });
        }
    }

    fn uniforms(&self) -> DrawUniforms {
        let s = &self.state;
        DrawUniforms {
            transform: math::to_f32_cols(s.projection.top() * s.model_view.top()),
            color: s.current_color.to_array(),
            viewport: s.viewport.map(|v| v as f32),
            params: [
                s.point_size,
                if s.tex_modulate { 1.0 } else { 0.0 },
                s.line_width,
                s.line_stipple.factor as f32,
            ],
            stipple: [s.line_stipple.pattern as f32, 0.0, 0.0, 0.0],
            polygon_stipple: s.packed_polygon_stipple(),
        }
    }

    /// Model space to window pixels.
    fn pixel_transform(&self) -> Mat4 {
        (self.window_matrix() * self.state.projection.top() * self.state.model_view.top()).as_mat4()
    }
}
