use std::sync::Arc;

use bytemuck::Pod;

use super::{category_for, DrawMode, SecondaryFormat, VertexFormat};
use crate::backend::{Backend, BufferHandle};
use crate::error::{RenderError, Result};
use crate::immediate::ImmediateRenderer;
use crate::pipeline::PipelineCategory;

#[derive(Debug, Copy, Clone)]
struct GpuBuffers {
    vertices: BufferHandle,
    secondary: Option<BufferHandle>,
}

/// A vertex stream plus an optional per-vertex secondary stream (color or
/// texture coordinate).
///
/// The secondary stream is either empty or exactly as long as the vertex
/// stream. Replacing the vertices with a different count drops it.
pub struct GeometryBuffer {
    backend: Arc<dyn Backend>,
    label: String,
    mode: DrawMode,
    vertex_format: VertexFormat,
    secondary_format: SecondaryFormat,
    vertex_count: usize,
    secondary_count: usize,
    vertex_bytes: Vec<u8>,
    secondary_bytes: Vec<u8>,
    gpu: Option<GpuBuffers>,
}

impl GeometryBuffer {
    pub(crate) fn new(backend: Arc<dyn Backend>, label: impl Into<String>, mode: DrawMode) -> Self {
        Self {
            backend,
            label: label.into(),
            mode,
            vertex_format: VertexFormat::None,
            secondary_format: SecondaryFormat::None,
            vertex_count: 0,
            secondary_count: 0,
            vertex_bytes: Vec::new(),
            secondary_bytes: Vec::new(),
            gpu: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DrawMode) {
        self.mode = mode;
    }

    pub fn vertex_format(&self) -> VertexFormat {
        self.vertex_format
    }

    /// Format of the secondary stream, `None` while it is empty.
    pub fn secondary_format(&self) -> SecondaryFormat {
        if self.secondary_count == 0 {
            SecondaryFormat::None
        } else {
            self.secondary_format
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn secondary_count(&self) -> usize {
        self.secondary_count
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertex_bytes
    }

    pub fn secondary_bytes(&self) -> &[u8] {
        &self.secondary_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn category(&self) -> Option<PipelineCategory> {
        category_for(self.vertex_format, self.secondary_format())
    }

    // ── vertices ──────────────────────────────────────────────────────────

    pub fn set_vertices_2d(&mut self, vertices: &[[f32; 2]]) {
        self.store_vertices(VertexFormat::D2, vertices);
    }

    pub fn set_vertices_3d(&mut self, vertices: &[[f32; 3]]) {
        self.store_vertices(VertexFormat::D3, vertices);
    }

    fn store_vertices<T: Pod>(&mut self, format: VertexFormat, vertices: &[T]) {
        self.release_gpu();
        if self.secondary_count != 0 && self.secondary_count != vertices.len() {
            log::debug!(
                "{}: {} vertices replace {}, dropping secondary stream",
                self.label,
                vertices.len(),
                self.vertex_count
            );
            self.clear_secondary();
        }
        self.vertex_format = format;
        self.vertex_count = vertices.len();
        self.vertex_bytes.clear();
        self.vertex_bytes.extend_from_slice(bytemuck::cast_slice(vertices));
    }

    // ── secondary ─────────────────────────────────────────────────────────

    pub fn set_colors(&mut self, colors: &[[f32; 4]]) -> Result<()> {
        self.store_secondary(SecondaryFormat::ColorFloat, colors)
    }

    pub fn set_colors_u8(&mut self, colors: &[[u8; 4]]) -> Result<()> {
        self.store_secondary(SecondaryFormat::ColorByte, colors)
    }

    pub fn set_tex_coords_1d(&mut self, coords: &[f32]) -> Result<()> {
        self.store_secondary(SecondaryFormat::Tex1D, coords)
    }

    pub fn set_tex_coords_2d(&mut self, coords: &[[f32; 2]]) -> Result<()> {
        self.store_secondary(SecondaryFormat::Tex2D, coords)
    }

    fn store_secondary<T: Pod>(&mut self, format: SecondaryFormat, values: &[T]) -> Result<()> {
        if values.len() != self.vertex_count {
            return Err(RenderError::InvalidGeometry(format!(
                "{}: {} {:?} values for {} vertices",
                self.label,
                values.len(),
                format,
                self.vertex_count
            )));
        }
        self.release_gpu();
        self.secondary_format = format;
        self.secondary_count = values.len();
        self.secondary_bytes.clear();
        self.secondary_bytes.extend_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    pub fn clear_secondary(&mut self) {
        if self.gpu.is_some_and(|g| g.secondary.is_some()) {
            self.release_gpu();
        }
        self.secondary_format = SecondaryFormat::None;
        self.secondary_count = 0;
        self.secondary_bytes.clear();
    }

    pub fn clear(&mut self) {
        self.release_gpu();
        self.vertex_format = VertexFormat::None;
        self.vertex_count = 0;
        self.vertex_bytes.clear();
        self.clear_secondary();
    }

    // ── decoding ──────────────────────────────────────────────────────────

    /// Positions widened to 3D.
    pub fn positions(&self) -> Vec<[f32; 3]> {
        match self.vertex_format {
            VertexFormat::None => Vec::new(),
            VertexFormat::D2 => self
                .vertex_bytes
                .chunks_exact(8)
                .map(|c| {
                    let [x, y]: [f32; 2] = bytemuck::pod_read_unaligned(c);
                    [x, y, 0.0]
                })
                .collect(),
            VertexFormat::D3 => self
                .vertex_bytes
                .chunks_exact(12)
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        }
    }

    /// Color of vertex `i` as float RGBA, when the secondary stream is a color.
    pub fn color_at(&self, i: usize) -> Option<[f32; 4]> {
        if i >= self.secondary_count {
            return None;
        }
        match self.secondary_format {
            SecondaryFormat::ColorFloat => {
                let bytes = self.secondary_bytes.get(i * 16..i * 16 + 16)?;
                Some(bytemuck::pod_read_unaligned(bytes))
            }
            SecondaryFormat::ColorByte => {
                let b = self.secondary_bytes.get(i * 4..i * 4 + 4)?;
                Some([b[0], b[1], b[2], b[3]].map(|c| c as f32 / 255.0))
            }
            _ => None,
        }
    }

    // ── gpu ───────────────────────────────────────────────────────────────

    /// Copies the CPU streams into backend buffers. Later draws bind them
    /// instead of sending bytes inline.
    pub fn upload(&mut self) -> Result<()> {
        self.release_gpu();
        if self.vertex_count == 0 {
            return Ok(());
        }

        let vertices = self.backend.create_buffer(&self.label, &self.vertex_bytes)?;
        let secondary = if self.secondary_count > 0 {
            match self.backend.create_buffer(&self.label, &self.secondary_bytes) {
                Ok(h) => Some(h),
                Err(e) => {
                    self.backend.release_buffer(vertices);
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::trace!("{}: uploaded {} vertices", self.label, self.vertex_count);
        self.gpu = Some(GpuBuffers { vertices, secondary });
        Ok(())
    }

    pub(crate) fn gpu_vertices(&self) -> Option<BufferHandle> {
        self.gpu.map(|g| g.vertices)
    }

    pub(crate) fn gpu_secondary(&self) -> Option<BufferHandle> {
        self.gpu.and_then(|g| g.secondary)
    }

    fn release_gpu(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            self.backend.release_buffer(gpu.vertices);
            if let Some(secondary) = gpu.secondary {
                self.backend.release_buffer(secondary);
            }
        }
    }

    /// Draws the buffer with the renderer's current state.
    pub fn draw(&self, renderer: &ImmediateRenderer) {
        renderer.draw_geometry(self);
    }
}

impl Drop for GeometryBuffer {
    fn drop(&mut self) {
        self.release_gpu();
    }
}

impl std::fmt::Debug for GeometryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryBuffer")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("vertex_format", &self.vertex_format)
            .field("secondary_format", &self.secondary_format())
            .field("vertex_count", &self.vertex_count)
            .field("secondary_count", &self.secondary_count)
            .field("uploaded", &self.gpu.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    fn buffer(mode: DrawMode) -> (Arc<NullBackend>, GeometryBuffer) {
        let backend = Arc::new(NullBackend::default());
        let geom = GeometryBuffer::new(backend.clone(), "test", mode);
        (backend, geom)
    }

    // ── invariants ────────────────────────────────────────────────────────

    #[test]
    fn secondary_must_match_vertex_count() {
        let (_b, mut g) = buffer(DrawMode::Triangles);
        g.set_vertices_2d(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(g.set_colors(&[[1.0; 4]; 2]).is_err());
        assert_eq!(g.secondary_count(), 0);
        g.set_colors(&[[1.0; 4]; 3]).unwrap();
        assert_eq!(g.secondary_count(), 3);
        assert_eq!(g.category(), Some(PipelineCategory::Color2D));
    }

    #[test]
    fn resizing_vertices_drops_secondary() {
        let (_b, mut g) = buffer(DrawMode::Points);
        g.set_vertices_3d(&[[0.0; 3]; 2]);
        g.set_tex_coords_2d(&[[0.0; 2]; 2]).unwrap();
        g.set_vertices_3d(&[[1.0; 3]; 2]);
        assert_eq!(g.secondary_count(), 2);
        g.set_vertices_3d(&[[1.0; 3]; 5]);
        assert_eq!(g.secondary_count(), 0);
        assert_eq!(g.secondary_format(), SecondaryFormat::None);
        assert_eq!(g.category(), Some(PipelineCategory::Plain));
    }

    #[test]
    fn byte_colors_decode() {
        let (_b, mut g) = buffer(DrawMode::Lines);
        g.set_vertices_2d(&[[0.0, 0.0], [4.0, 2.0]]);
        g.set_colors_u8(&[[255, 0, 0, 255], [0, 0, 255, 0]]).unwrap();
        assert_eq!(g.color_at(1), Some([0.0, 0.0, 1.0, 0.0]));
        assert_eq!(g.color_at(2), None);
        assert_eq!(g.positions()[1], [4.0, 2.0, 0.0]);
    }

    // ── gpu lifetime ──────────────────────────────────────────────────────

    #[test]
    fn upload_and_drop_release_buffers() {
        let (backend, mut g) = buffer(DrawMode::Triangles);
        g.set_vertices_3d(&[[0.0; 3]; 3]);
        g.set_colors(&[[1.0; 4]; 3]).unwrap();
        g.upload().unwrap();
        assert!(g.is_uploaded());
        assert_eq!(backend.live_buffers(), 2);

        g.set_vertices_3d(&[[2.0; 3]; 3]);
        assert!(!g.is_uploaded());
        assert_eq!(backend.live_buffers(), 0);

        g.upload().unwrap();
        drop(g);
        assert_eq!(backend.live_buffers(), 0);
    }
}
