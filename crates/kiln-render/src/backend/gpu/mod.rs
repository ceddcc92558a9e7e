//! wgpu backend.
//!
//! Draws are deferred: each [`Backend::draw`] uploads its vertex bytes and
//! uniform block, then queues a pending draw. [`Backend::flush`] encodes the
//! queue into one render pass against the bound target and submits it.
//!
//! Pipeline states are compiled lazily per topology and target format, so a
//! single handle serves point, line and triangle draws alike.

use std::collections::HashMap;
use std::sync::mpsc;

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{
    level_extent, mip_chain, Api, AttrFormat, Backend, BackendCaps, BlendMode, BufferHandle,
    DrawCall, DrawUniforms, FilterMode, PipelineDesc, PipelineHandle, PixelFormat, SamplerParams,
    ScissorRect, StepMode, TargetBinding, TextureDesc, TextureHandle, Topology, VertexSource,
    WrapMode,
};
use crate::error::{RenderError, Result};

const SHADER_SOURCE: &str = include_str!("kiln.wgsl");

/// Maps the adapter's API to the family reported by [`Backend::api`].
pub fn api_for(backend: wgpu::Backend) -> Api {
    match backend {
        wgpu::Backend::Gl => Api::ShaderBased,
        _ => Api::PlatformNative,
    }
}

pub(crate) fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

/// Inverse of [`texture_format`] for surface formats; `None` if unsupported.
pub fn pixel_format(format: wgpu::TextureFormat) -> Option<PixelFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => PixelFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => PixelFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => PixelFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => PixelFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::R8Unorm => PixelFormat::R8Unorm,
        _ => return None,
    })
}

fn vertex_format(format: AttrFormat) -> wgpu::VertexFormat {
    match format {
        AttrFormat::Float32 => wgpu::VertexFormat::Float32,
        AttrFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        AttrFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        AttrFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        AttrFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

fn primitive_topology(topology: Topology) -> Option<wgpu::PrimitiveTopology> {
    Some(match topology {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::TriangleFan | Topology::Quads => return None,
    })
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::InverseDestination => {
            let component = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::OneMinusDstAlpha,
                dst_factor: wgpu::BlendFactor::DstAlpha,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: component,
                alpha: component,
            })
        }
    }
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Swaps red and blue in place for BGRA textures; a no-op otherwise.
fn swizzle_bgra(format: PixelFormat, data: &mut [u8]) {
    if format.is_bgra() {
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
}

struct GpuPipeline {
    desc: PipelineDesc,
    variants: HashMap<(Topology, wgpu::TextureFormat), wgpu::RenderPipeline>,
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    sample_view: wgpu::TextureView,
    target_view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

struct ScreenTarget {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
}

struct PendingDraw {
    pipeline: wgpu::RenderPipeline,
    vertex_buffers: Vec<(wgpu::Buffer, u64)>,
    uniforms: wgpu::BindGroup,
    texture: wgpu::BindGroup,
    vertex_count: u32,
    instance_count: u32,
    scissor: Option<ScissorRect>,
    /// x, y, width, height with a bottom-left origin; zero size means full target.
    viewport: [f32; 4],
}

#[derive(Default)]
struct GpuState {
    next_id: u32,
    pipelines: HashMap<u32, GpuPipeline>,
    buffers: HashMap<u32, wgpu::Buffer>,
    textures: HashMap<u32, GpuTexture>,
    screen: Option<ScreenTarget>,
    target: TargetBinding,
    scissor: Option<ScissorRect>,
    pending: Vec<PendingDraw>,
    pending_clear: Option<wgpu::Color>,
    warned_depth: bool,
}

impl GpuState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Backend over a wgpu device/queue pair.
///
/// Points are always one pixel wide and the depth test is not available:
/// targets carry no depth attachment.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    api: Api,
    caps: BackendCaps,

    shader: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    fallback_texture: wgpu::BindGroup,

    state: Mutex<GpuState>,
}

impl WgpuBackend {
    /// `adapter_backend` decides the reported [`Api`]; `transfer_budget` caps
    /// the vertex bytes of one draw.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_backend: wgpu::Backend,
        transfer_budget: usize,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kiln shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln uniforms bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<DrawUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        // Bound whenever a draw samples without a texture.
        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("kiln fallback texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let white_view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let white_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln fallback sampler"),
            ..Default::default()
        });
        let fallback_texture = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln fallback texture bg"),
            layout: &texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&white_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&white_sampler),
                },
            ],
        });

        let api = api_for(adapter_backend);
        log::debug!("wgpu backend ready ({adapter_backend:?} -> {api:?})");

        Self {
            device,
            queue,
            api,
            caps: BackendCaps::command_buffer(transfer_budget),
            shader,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            fallback_texture,
            state: Mutex::new(GpuState::default()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Makes `view` the target of [`TargetBinding::Screen`] for this frame.
    pub fn attach_screen(
        &self,
        view: wgpu::TextureView,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) {
        let mut state = self.state.lock();
        if let Err(e) = self.flush_locked(&mut state) {
            log::error!("flush before screen attach failed: {e}");
        }
        state.screen = Some(ScreenTarget { view, format, size });
    }

    /// Flushes pending screen draws and forgets the surface view.
    pub fn detach_screen(&self) -> Result<()> {
        let mut state = self.state.lock();
        let result = self.flush_locked(&mut state);
        state.screen = None;
        result
    }

    fn sampler(&self, params: SamplerParams) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln sampler"),
            address_mode_u: address_mode(params.wrap_s),
            address_mode_v: address_mode(params.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(params.mag_filter),
            min_filter: filter_mode(params.min_filter),
            ..Default::default()
        })
    }

    fn texture_bind_group(
        &self,
        view: &wgpu::TextureView,
        params: SamplerParams,
    ) -> wgpu::BindGroup {
        let sampler = self.sampler(params);
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln texture bg"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        })
    }

    fn build_pipeline(
        &self,
        desc: &PipelineDesc,
        topology: wgpu::PrimitiveTopology,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let streams = desc.layout.streams();
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = streams
            .iter()
            .map(|s| {
                s.attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = streams
            .iter()
            .zip(&attributes)
            .map(|(s, attrs)| wgpu::VertexBufferLayout {
                array_stride: s.stride,
                step_mode: match s.step {
                    StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    StepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes: attrs,
            })
            .collect();

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some(desc.vertex_fn),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(desc.fragment_fn),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: blend_state(desc.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    fn target_format(state: &GpuState) -> Option<wgpu::TextureFormat> {
        match state.target {
            TargetBinding::Detached => None,
            TargetBinding::Screen => state.screen.as_ref().map(|s| s.format),
            TargetBinding::Texture(h) => state
                .textures
                .get(&h.0)
                .map(|t| texture_format(t.desc.format)),
        }
    }

    fn flush_locked(&self, state: &mut GpuState) -> Result<()> {
        if state.pending.is_empty() && state.pending_clear.is_none() {
            return Ok(());
        }

        let pending = std::mem::take(&mut state.pending);
        let clear = state.pending_clear.take();

        let (view, size) = match state.target {
            TargetBinding::Detached => return Ok(()),
            TargetBinding::Screen => match state.screen.as_ref() {
                Some(s) => (s.view.clone(), s.size),
                None => {
                    log::debug!("dropping {} draw(s): no screen attached", pending.len());
                    return Ok(());
                }
            },
            TargetBinding::Texture(h) => match state.textures.get(&h.0) {
                Some(t) => (t.target_view.clone(), (t.desc.width, t.desc.height)),
                None => {
                    return Err(RenderError::UnknownHandle {
                        kind: "texture",
                        id: h.0,
                    });
                }
            },
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln flush encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match clear {
                            Some(c) => wgpu::LoadOp::Clear(c),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &pending {
                let (sx, sy, sw, sh) = clamp_scissor(draw.scissor, size);
                if sw == 0 || sh == 0 {
                    continue;
                }
                rpass.set_scissor_rect(sx, sy, sw, sh);
                let Some([vx, vy, vw, vh]) = clamp_viewport(draw.viewport, size) else {
                    continue;
                };
                rpass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
                rpass.set_pipeline(&draw.pipeline);
                rpass.set_bind_group(0, &draw.uniforms, &[]);
                rpass.set_bind_group(1, &draw.texture, &[]);
                for (slot, (buffer, offset)) in draw.vertex_buffers.iter().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
                }
                rpass.draw(0..draw.vertex_count, 0..draw.instance_count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Blocks until submitted work is done. Readback callbacks only fire from
    /// inside this poll, so a failed poll must not fall through to `recv`.
    fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map(|_| ())
            .map_err(poll_failed)
    }

    fn write_level(&self, tex: &GpuTexture, level: u32, data: &[u8]) {
        let (w, h) = level_extent(tex.desc.width, tex.desc.height, level);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * tex.desc.format.bytes_per_pixel() as u32),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Level 0 in the texture's own channel layout, rows tightly packed.
    fn read_level0(&self, tex: &GpuTexture) -> Result<Vec<u8>> {
        let (width, height) = (tex.desc.width, tex.desc.height);
        let bpp = tex.desc.format.bytes_per_pixel() as u32;
        let row_bytes = width * bpp;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln readback"),
            size: padded_row_bytes as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.wait_idle()?;

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RenderError::Readback(e.to_string())),
            Err(e) => return Err(RenderError::Readback(e.to_string())),
        }

        let mut out = Vec::with_capacity((row_bytes * height) as usize);
        {
            let data = slice.get_mapped_range();
            for y in 0..height as usize {
                let start = y * padded_row_bytes as usize;
                out.extend_from_slice(&data[start..start + row_bytes as usize]);
            }
        }
        readback.unmap();
        Ok(out)
    }
}

fn poll_failed(e: wgpu::PollError) -> RenderError {
    RenderError::Backend(format!("device poll failed: {e}"))
}

/// Flips a bottom-left viewport to top-left and clips it to the target,
/// which wgpu requires. A zero-sized viewport covers the whole target.
fn clamp_viewport([x, y, w, h]: [f32; 4], (tw, th): (u32, u32)) -> Option<[f32; 4]> {
    let (tw, th) = (tw as f32, th as f32);
    if w <= 0.0 || h <= 0.0 {
        return Some([0.0, 0.0, tw, th]);
    }
    let top = th - y - h;
    let (x0, y0) = (x.max(0.0), top.max(0.0));
    let (x1, y1) = ((x + w).min(tw), (top + h).min(th));
    (x1 > x0 && y1 > y0).then(|| [x0, y0, x1 - x0, y1 - y0])
}

/// Scissor clamped to the target; `None` covers the whole target.
fn clamp_scissor(rect: Option<ScissorRect>, (tw, th): (u32, u32)) -> (u32, u32, u32, u32) {
    match rect {
        None => (0, 0, tw, th),
        Some(r) => {
            let x = r.x.min(tw);
            let y = r.y.min(th);
            let x2 = r.x.saturating_add(r.width).min(tw);
            let y2 = r.y.saturating_add(r.height).min(th);
            (x, y, x2 - x, y2 - y)
        }
    }
}

impl Backend for WgpuBackend {
    fn api(&self) -> Api {
        self.api
    }

    fn caps(&self) -> BackendCaps {
        self.caps
    }

    fn compile_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        for name in [desc.vertex_fn, desc.fragment_fn] {
            if !SHADER_SOURCE.contains(&format!("fn {name}(")) {
                return Err(RenderError::MissingFunction(name.to_string()));
            }
        }

        // Build the common triangle variant now so layout mismatches surface
        // at cache initialization rather than mid-frame.
        let format = texture_format(desc.color_format);
        let triangles = self.build_pipeline(desc, wgpu::PrimitiveTopology::TriangleList, format);

        let mut state = self.state.lock();
        let id = state.next_id();
        let mut variants = HashMap::new();
        variants.insert((Topology::TriangleList, format), triangles);
        state.pipelines.insert(
            id,
            GpuPipeline {
                desc: desc.clone(),
                variants,
            },
        );
        log::trace!("compiled pipeline `{}` as {id}", desc.label);
        Ok(PipelineHandle(id))
    }

    fn release_pipeline(&self, handle: PipelineHandle) {
        self.state.lock().pipelines.remove(&handle.0);
    }

    fn create_buffer(&self, label: &str, contents: &[u8]) -> Result<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let mut state = self.state.lock();
        let id = state.next_id();
        state.buffers.insert(id, buffer);
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

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let target_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("kiln target view"),
            mip_level_count: Some(1),
            ..Default::default()
        });
        let bind_group = self.texture_bind_group(&sample_view, desc.sampler);

        let mut state = self.state.lock();
        let id = state.next_id();
        state.textures.insert(
            id,
            GpuTexture {
                desc: desc.clone(),
                texture,
                sample_view,
                target_view,
                bind_group,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&self, handle: TextureHandle, data: &[u8]) -> Result<()> {
        let state = self.state.lock();
        let tex = state.textures.get(&handle.0).ok_or(RenderError::UnknownHandle {
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

        if tex.desc.format.is_bgra() {
            let mut native = data.to_vec();
            swizzle_bgra(tex.desc.format, &mut native);
            self.write_level(tex, 0, &native);
        } else {
            self.write_level(tex, 0, data);
        }
        Ok(())
    }

    fn set_sampler(&self, handle: TextureHandle, sampler: SamplerParams) {
        let mut state = self.state.lock();
        let Some(tex) = state.textures.get_mut(&handle.0) else {
            return;
        };
        if tex.desc.sampler == sampler {
            return;
        }
        tex.desc.sampler = sampler;
        tex.bind_group = self.texture_bind_group(&tex.sample_view, sampler);
    }

    fn read_texture(&self, handle: TextureHandle) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;

        let tex = state.textures.get(&handle.0).ok_or(RenderError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })?;
        let mut pixels = self.read_level0(tex)?;

        if tex.desc.format.is_alpha_only() {
            return Ok(pixels.iter().flat_map(|&v| [v, v, v, v]).collect());
        }
        swizzle_bgra(tex.desc.format, &mut pixels);
        log::trace!("read back texture {} ({} bytes)", handle.0, pixels.len());
        Ok(pixels)
    }

    fn generate_mipmaps(&self, handle: TextureHandle) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;

        let tex = state.textures.get(&handle.0).ok_or(RenderError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })?;
        if tex.desc.mip_levels <= 1 {
            return Ok(());
        }

        // Channel order does not matter for filtering, so the chain is built
        // and written back in the texture's native layout.
        let level0 = self.read_level0(tex)?;
        let chain = mip_chain(
            &level0,
            tex.desc.width,
            tex.desc.height,
            tex.desc.format,
            tex.desc.mip_levels,
        )?;
        for (i, level) in chain.iter().enumerate() {
            self.write_level(tex, i as u32 + 1, level);
        }

        self.queue.submit(std::iter::empty());
        self.wait_idle()?;
        Ok(())
    }

    fn release_texture(&self, handle: TextureHandle) {
        let mut state = self.state.lock();
        if state.target == TargetBinding::Texture(handle) {
            if let Err(e) = self.flush_locked(&mut state) {
                log::error!("flush before texture release failed: {e}");
            }
            state.target = TargetBinding::Detached;
        }
        if let Some(tex) = state.textures.remove(&handle.0) {
            tex.texture.destroy();
        }
    }

    fn bind_target(&self, target: TargetBinding) -> TargetBinding {
        let mut state = self.state.lock();
        if state.target != target {
            if let Err(e) = self.flush_locked(&mut state) {
                log::error!("flush before target switch failed: {e}");
            }
        }
        std::mem::replace(&mut state.target, target)
    }

    fn has_target(&self) -> bool {
        let state = self.state.lock();
        match state.target {
            TargetBinding::Detached => false,
            TargetBinding::Screen => state.screen.is_some(),
            TargetBinding::Texture(h) => state.textures.contains_key(&h.0),
        }
    }

    fn set_scissor(&self, rect: Option<ScissorRect>) {
        self.state.lock().scissor = rect;
    }

    fn clear(&self, color: Option<[f32; 4]>, _depth: bool) {
        let mut state = self.state.lock();
        let Some([r, g, b, a]) = color else {
            return;
        };
        if !state.pending.is_empty() {
            if let Err(e) = self.flush_locked(&mut state) {
                log::error!("flush before clear failed: {e}");
            }
        }
        state.pending_clear = Some(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        });
    }

    fn draw(&self, call: &DrawCall<'_>) {
        if call.vertex_count == 0 || call.instance_count == 0 {
            return;
        }

        let mut state = self.state.lock();

        if call.depth_test && !state.warned_depth {
            log::warn!("wgpu backend: depth test requested but targets have no depth buffer");
            state.warned_depth = true;
        }

        let Some(format) = Self::target_format(&state) else {
            log::trace!("wgpu backend: draw without a target dropped");
            return;
        };
        let Some(topology) = primitive_topology(call.topology) else {
            log::error!("wgpu backend: {:?} is not a native topology", call.topology);
            return;
        };

        let key = (call.topology, format);
        let (desc, existing) = match state.pipelines.get(&call.pipeline.0) {
            Some(entry) => (entry.desc.clone(), entry.variants.get(&key).cloned()),
            None => {
                log::error!("wgpu backend: unknown pipeline {}", call.pipeline.0);
                return;
            }
        };
        let pipeline = match existing {
            Some(p) => p,
            None => {
                let built = self.build_pipeline(&desc, topology, format);
                if let Some(entry) = state.pipelines.get_mut(&call.pipeline.0) {
                    entry.variants.insert(key, built.clone());
                }
                built
            }
        };

        let mut vertex_buffers = Vec::with_capacity(call.streams.len());
        for source in &call.streams {
            match *source {
                VertexSource::Bytes(bytes) => {
                    if bytes.is_empty() {
                        return;
                    }
                    let buffer = self
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("kiln inline vertices"),
                            contents: bytes,
                            usage: wgpu::BufferUsages::VERTEX,
                        });
                    vertex_buffers.push((buffer, 0));
                }
                VertexSource::Buffer { handle, offset } => {
                    let Some(buffer) = state.buffers.get(&handle.0) else {
                        log::error!("wgpu backend: unknown buffer {}", handle.0);
                        return;
                    };
                    vertex_buffers.push((buffer.clone(), offset));
                }
            }
        }

        let ubo = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln draw ubo"),
                contents: bytemuck::bytes_of(&call.uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let uniforms = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln draw bg"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        });

        let texture = call
            .texture
            .and_then(|h| state.textures.get(&h.0))
            .map(|t| t.bind_group.clone())
            .unwrap_or_else(|| self.fallback_texture.clone());

        let scissor = state.scissor;
        state.pending.push(PendingDraw {
            pipeline,
            vertex_buffers,
            uniforms,
            texture,
            vertex_count: call.vertex_count,
            instance_count: call.instance_count,
            scissor,
            viewport: call.uniforms.viewport,
        });
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }
}
