//! Recording backend.
//!
//! Keeps every object on the CPU, records each draw for inspection and
//! rasterizes point primitives into texture targets (row 0 is the top row, as
//! on command-buffer APIs). Used by tests and headless tooling.

use std::collections::HashMap;

use glam::{Mat4, Vec4};
use parking_lot::Mutex;

use super::{
    level_extent, mip_chain, Api, AttrFormat, Backend, BackendCaps, BlendMode, BufferHandle,
    DrawCall, DrawUniforms, FillMode, PipelineDesc, PipelineHandle, SamplerParams, ScissorRect,
    StepMode, TargetBinding, TextureDesc, TextureHandle, Topology, VertexLayout, VertexSource,
};
use crate::error::{RenderError, Result};

#[derive(Debug, Clone)]
pub struct NullBackendConfig {
    /// Reported API; lets tests stand in for a specific backend family.
    pub api: Api,
    pub caps: BackendCaps,
    /// Shader entry point treated as missing by `compile_pipeline`.
    pub fail_function: Option<String>,
}

impl Default for NullBackendConfig {
    fn default() -> Self {
        Self {
            api: Api::DebugNull,
            caps: BackendCaps::command_buffer(4096),
            fail_function: None,
        }
    }
}

/// A draw as the null backend received it.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub pipeline: PipelineHandle,
    pub label: String,
    pub layout: VertexLayout,
    pub blend: BlendMode,
    pub topology: Topology,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub streams: Vec<Vec<u8>>,
    pub uniforms: DrawUniforms,
    pub texture: Option<TextureHandle>,
    pub target: TargetBinding,
    pub scissor: Option<ScissorRect>,
    pub fill: FillMode,
    pub depth_test: bool,
}

impl DrawRecord {
    /// Decodes the attribute bound at `location`, one entry per vertex (or
    /// instance), widened to four components.
    pub fn attribute(&self, location: u32) -> Option<Vec<[f32; 4]>> {
        for (stream, bytes) in self.layout.streams().iter().zip(&self.streams) {
            let Some(a) = stream.attributes.iter().find(|a| a.location == location) else {
                continue;
            };
            let count = match stream.step {
                StepMode::Vertex => self.vertex_count,
                StepMode::Instance => self.instance_count,
            } as usize;

            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let base = i * stream.stride as usize + a.offset as usize;
                out.push(decode(a.format, bytes.get(base..)?)?);
            }
            return Some(out);
        }
        None
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.attribute(0)
            .unwrap_or_default()
            .into_iter()
            .map(|p| [p[0], p[1], p[2]])
            .collect()
    }

    pub fn colors(&self) -> Option<Vec<[f32; 4]>> {
        self.attribute(1)
    }
}

fn decode(format: AttrFormat, bytes: &[u8]) -> Option<[f32; 4]> {
    let f = |i: usize| -> Option<f32> {
        let raw: [u8; 4] = bytes.get(i * 4..i * 4 + 4)?.try_into().ok()?;
        Some(f32::from_ne_bytes(raw))
    };
    Some(match format {
        AttrFormat::Float32 => [f(0)?, 0.0, 0.0, 1.0],
        AttrFormat::Float32x2 => [f(0)?, f(1)?, 0.0, 1.0],
        AttrFormat::Float32x3 => [f(0)?, f(1)?, f(2)?, 1.0],
        AttrFormat::Float32x4 => [f(0)?, f(1)?, f(2)?, f(3)?],
        AttrFormat::Unorm8x4 => {
            let b = bytes.get(..4)?;
            [
                b[0] as f32 / 255.0,
                b[1] as f32 / 255.0,
                b[2] as f32 / 255.0,
                b[3] as f32 / 255.0,
            ]
        }
    })
}

struct NullTexture {
    desc: TextureDesc,
    /// Level 0 first; RGBA (or single channel) rows, top row first.
    levels: Vec<Vec<u8>>,
}

#[derive(Default)]
struct NullState {
    next_id: u32,
    pipelines: HashMap<u32, PipelineDesc>,
    buffers: HashMap<u32, Vec<u8>>,
    textures: HashMap<u32, NullTexture>,
    target: TargetBinding,
    scissor: Option<ScissorRect>,
    draws: Vec<DrawRecord>,
    compiled_total: usize,
    flushes: usize,
    clears: usize,
}

impl NullState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// See the module docs.
pub struct NullBackend {
    config: NullBackendConfig,
    state: Mutex<NullState>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(NullBackendConfig::default())
    }
}

impl NullBackend {
    /// Starts bound to the screen so draws are recorded without extra setup.
    pub fn new(config: NullBackendConfig) -> Self {
        let state = NullState {
            target: TargetBinding::Screen,
            ..NullState::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.lock().draws.clone()
    }

    pub fn take_draws(&self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.state.lock().draws)
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Pipelines compiled over the backend's lifetime, released or not.
    pub fn compiled_total(&self) -> usize {
        self.state.lock().compiled_total
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clears
    }

    pub fn scissor(&self) -> Option<ScissorRect> {
        self.state.lock().scissor
    }

    pub fn target(&self) -> TargetBinding {
        self.state.lock().target
    }

    pub fn texture_level(&self, handle: TextureHandle, level: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.textures.get(&handle.0)?.levels.get(level).cloned()
    }

    pub fn sampler(&self, handle: TextureHandle) -> Option<SamplerParams> {
        Some(self.state.lock().textures.get(&handle.0)?.desc.sampler)
    }
}

impl Backend for NullBackend {
    fn api(&self) -> Api {
        self.config.api
    }

    fn caps(&self) -> BackendCaps {
        self.config.caps
    }

    fn compile_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        if let Some(missing) = self.config.fail_function.as_deref() {
            if desc.vertex_fn == missing || desc.fragment_fn == missing {
                return Err(RenderError::MissingFunction(missing.to_string()));
            }
        }

        let mut state = self.state.lock();
        let id = state.next_id();
        state.pipelines.insert(id, desc.clone());
        state.compiled_total += 1;
        Ok(PipelineHandle(id))
    }

    fn release_pipeline(&self, handle: PipelineHandle) {
        self.state.lock().pipelines.remove(&handle.0);
    }

    fn create_buffer(&self, _label: &str, contents: &[u8]) -> Result<BufferHandle> {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.buffers.insert(id, contents.to_vec());
        Ok(BufferHandle(id))
    }

    fn release_buffer(&self, handle: BufferHandle) {
        self.state.lock().buffers.remove(&handle.0);
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "texture `{}` has zero extent",
                desc.label
            )));
        }

        let levels = (0..desc.mip_levels.max(1))
            .map(|level| {
                let (w, h) = level_extent(desc.width, desc.height, level);
                vec![0u8; w as usize * h as usize * desc.format.bytes_per_pixel()]
            })
            .collect();

        let mut state = self.state.lock();
        let id = state.next_id();
        state.textures.insert(
            id,
            NullTexture {
                desc: desc.clone(),
                levels,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&self, handle: TextureHandle, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let tex = state.textures.get_mut(&handle.0).ok_or(RenderError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })?;
        if data.len() != tex.desc.level0_len() {
            return Err(RenderError::Backend(format!(
                "texture `{}` expects {} bytes, got {}",
                tex.desc.label,
                tex.desc.level0_len(),
                data.len()
            )));
        }
        tex.levels[0] = data.to_vec();
        Ok(())
    }

    fn set_sampler(&self, handle: TextureHandle, sampler: SamplerParams) {
        if let Some(tex) = self.state.lock().textures.get_mut(&handle.0) {
            tex.desc.sampler = sampler;
        }
    }

    fn read_texture(&self, handle: TextureHandle) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let tex = state.textures.get(&handle.0).ok_or(RenderError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })?;

        if tex.desc.format.is_alpha_only() {
            return Ok(tex.levels[0].iter().flat_map(|&v| [v, v, v, v]).collect());
        }
        Ok(tex.levels[0].clone())
    }

    fn generate_mipmaps(&self, handle: TextureHandle) -> Result<()> {
        let mut state = self.state.lock();
        let tex = state.textures.get_mut(&handle.0).ok_or(RenderError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })?;

        let chain = mip_chain(
            &tex.levels[0],
            tex.desc.width,
            tex.desc.height,
            tex.desc.format,
            tex.desc.mip_levels,
        )?;
        for (i, level) in chain.into_iter().enumerate() {
            tex.levels[i + 1] = level;
        }
        Ok(())
    }

    fn release_texture(&self, handle: TextureHandle) {
        self.state.lock().textures.remove(&handle.0);
    }

    fn bind_target(&self, target: TargetBinding) -> TargetBinding {
        std::mem::replace(&mut self.state.lock().target, target)
    }

    fn has_target(&self) -> bool {
        self.state.lock().target != TargetBinding::Detached
    }

    fn set_scissor(&self, rect: Option<ScissorRect>) {
        self.state.lock().scissor = rect;
    }

    fn clear(&self, color: Option<[f32; 4]>, _depth: bool) {
        let mut state = self.state.lock();
        state.clears += 1;

        let (TargetBinding::Texture(handle), Some(color)) = (state.target, color) else {
            return;
        };
        if let Some(tex) = state.textures.get_mut(&handle.0) {
            let px = crate::color::Rgba::from(color).to_u8();
            let texel: &[u8] = if tex.desc.format.is_alpha_only() {
                &px[3..]
            } else {
                &px
            };
            tex.levels[0] = texel.repeat(tex.desc.width as usize * tex.desc.height as usize);
        }
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let mut state = self.state.lock();

        if state.target == TargetBinding::Detached {
            log::trace!("null backend: draw without a target dropped");
            return;
        }

        let Some(desc) = state.pipelines.get(&call.pipeline.0).cloned() else {
            log::error!("null backend: unknown pipeline {}", call.pipeline.0);
            return;
        };

        let mut streams = Vec::with_capacity(call.streams.len());
        for source in &call.streams {
            match *source {
                VertexSource::Bytes(bytes) => streams.push(bytes.to_vec()),
                VertexSource::Buffer { handle, offset } => {
                    let Some(buf) = state.buffers.get(&handle.0) else {
                        log::error!("null backend: unknown buffer {}", handle.0);
                        return;
                    };
                    streams.push(buf.get(offset as usize..).unwrap_or_default().to_vec());
                }
            }
        }

        let record = DrawRecord {
            pipeline: call.pipeline,
            label: desc.label,
            layout: desc.layout,
            blend: desc.blend,
            topology: call.topology,
            vertex_count: call.vertex_count,
            instance_count: call.instance_count,
            streams,
            uniforms: call.uniforms,
            texture: call.texture,
            target: state.target,
            scissor: state.scissor,
            fill: call.fill,
            depth_test: call.depth_test,
        };

        if let (TargetBinding::Texture(handle), Topology::PointList) =
            (record.target, record.topology)
        {
            if let Some(tex) = state.textures.get_mut(&handle.0) {
                rasterize_points(tex, &record);
            }
        }

        state.draws.push(record);
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}

/// Writes one texel per point; row 0 is the top of the target.
fn rasterize_points(tex: &mut NullTexture, record: &DrawRecord) {
    let Some(positions) = record.attribute(0) else {
        return;
    };
    let colors = record.colors();
    let m = Mat4::from_cols_array_2d(&record.uniforms.transform);
    let (w, h) = (tex.desc.width as f32, tex.desc.height as f32);
    let bpp = tex.desc.format.bytes_per_pixel();

    for (i, p) in positions.iter().enumerate() {
        let clip = m * Vec4::new(p[0], p[1], p[2], 1.0);
        if clip.w == 0.0 {
            continue;
        }
        let x = ((clip.x / clip.w) * 0.5 + 0.5) * w;
        let y = (0.5 - (clip.y / clip.w) * 0.5) * h;
        if !(0.0..w).contains(&x) || !(0.0..h).contains(&y) {
            continue;
        }

        let color = colors
            .as_ref()
            .and_then(|c| c.get(i).copied())
            .unwrap_or(record.uniforms.color);
        let px = crate::color::Rgba::from(color).to_u8();

        let at = (y as usize * tex.desc.width as usize + x as usize) * bpp;
        let texel: &[u8] = if bpp == 1 { &px[3..] } else { &px };
        tex.levels[0][at..at + bpp].copy_from_slice(texel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PixelFormat;

    fn point_pipeline(backend: &NullBackend) -> PipelineHandle {
        backend
            .compile_pipeline(&PipelineDesc {
                label: "points".into(),
                vertex_fn: "vs_plain",
                fragment_fn: "fs_color",
                layout: VertexLayout::Plain3D,
                blend: BlendMode::Opaque,
                color_format: PixelFormat::Rgba8Unorm,
            })
            .unwrap()
    }

    fn target(backend: &NullBackend, dim: u32) -> TextureHandle {
        backend
            .create_texture(&TextureDesc {
                label: "target".into(),
                width: dim,
                height: dim,
                format: PixelFormat::Rgba8Unorm,
                mip_levels: 1,
                render_target: true,
                sampler: SamplerParams::default(),
            })
            .unwrap()
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    #[test]
    fn missing_function_fails_compile() {
        let backend = NullBackend::new(NullBackendConfig {
            fail_function: Some("fs_color".into()),
            ..Default::default()
        });
        let err = backend
            .compile_pipeline(&PipelineDesc {
                label: "x".into(),
                vertex_fn: "vs_plain",
                fragment_fn: "fs_color",
                layout: VertexLayout::Plain3D,
                blend: BlendMode::Opaque,
                color_format: PixelFormat::Rgba8Unorm,
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingFunction(f) if f == "fs_color"));
        assert_eq!(backend.live_pipelines(), 0);
    }

    #[test]
    fn release_tracks_live_objects() {
        let backend = NullBackend::default();
        let p = point_pipeline(&backend);
        let b = backend.create_buffer("b", &[0; 12]).unwrap();
        assert_eq!((backend.live_pipelines(), backend.live_buffers()), (1, 1));
        backend.release_pipeline(p);
        backend.release_buffer(b);
        assert_eq!((backend.live_pipelines(), backend.live_buffers()), (0, 0));
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn write_texture_checks_size() {
        let backend = NullBackend::default();
        let t = target(&backend, 2);
        assert!(backend.write_texture(t, &[0; 15]).is_err());
        assert!(backend.write_texture(t, &[7; 16]).is_ok());
        assert_eq!(backend.read_texture(t).unwrap(), vec![7; 16]);
    }

    #[test]
    fn point_rasterizes_with_top_row_origin() {
        let backend = NullBackend::default();
        let p = point_pipeline(&backend);
        let t = target(&backend, 4);
        backend.bind_target(TargetBinding::Texture(t));
        backend.clear(Some([0.0; 4]), false);

        // NDC (−0.9, +0.9) is the top-left texel.
        let pos: [f32; 3] = [-0.9, 0.9, 0.0];
        backend.draw(&DrawCall {
            pipeline: p,
            topology: Topology::PointList,
            uniforms: DrawUniforms::default(),
            streams: vec![VertexSource::Bytes(bytemuck::bytes_of(&pos))],
            vertex_count: 1,
            instance_count: 1,
            texture: None,
            fill: FillMode::Fill,
            depth_test: false,
        });

        let pixels = backend.read_texture(t).unwrap();
        assert_eq!(&pixels[0..4], &[255, 255, 255, 255]);
        assert!(pixels[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn detached_target_drops_draws() {
        let backend = NullBackend::default();
        let p = point_pipeline(&backend);
        backend.bind_target(TargetBinding::Detached);
        assert!(!backend.has_target());
        backend.draw(&DrawCall {
            pipeline: p,
            topology: Topology::PointList,
            uniforms: DrawUniforms::default(),
            streams: vec![VertexSource::Bytes(&[0; 12])],
            vertex_count: 1,
            instance_count: 1,
            texture: None,
            fill: FillMode::Fill,
            depth_test: false,
        });
        assert!(backend.draws().is_empty());
    }
}
