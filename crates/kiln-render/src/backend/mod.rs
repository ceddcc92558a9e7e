//! Backend abstraction.
//!
//! A backend owns GPU objects behind small opaque handles and executes
//! [`DrawCall`]s. Everything above this module (geometry, pipeline cache,
//! immediate renderer) is written against the [`Backend`] trait; only
//! [`crate::ResourceManager`] knows which concrete backends exist.
//!
//! Vertex attribute locations are shared by every layout:
//! 0 position, 1 color, 2 texture coordinate, 3.. layout-specific extras.

pub mod gpu;
mod mipmap;
pub mod null;

pub use gpu::WgpuBackend;
pub(crate) use mipmap::{level_extent, mip_chain, mip_level_count};
pub use null::{DrawRecord, NullBackend, NullBackendConfig};

use bytemuck::{Pod, Zeroable};

use crate::error::Result;

/// Identifies the graphics API family behind the active backend.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Api {
    #[default]
    Undefined,
    /// Array-pointer style GL with native fans and quads.
    LegacyFixedFunction,
    /// Buffer-object GL with programmable pipelines.
    ShaderBased,
    /// Command-buffer APIs (Metal, Vulkan, D3D12) with bounded inline uploads.
    PlatformNative,
    /// Recording backend without a GPU.
    DebugNull,
}

/// What a backend can draw natively; the immediate renderer emulates the rest.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BackendCaps {
    pub native_fans: bool,
    pub native_quads: bool,
    pub native_polygon_mode: bool,
    /// Byte limit of vertex data per draw, `None` for unlimited.
    pub transfer_budget: Option<usize>,
}

impl BackendCaps {
    /// Caps of a legacy GL context: every primitive is native.
    pub const fn legacy() -> Self {
        Self {
            native_fans: true,
            native_quads: true,
            native_polygon_mode: true,
            transfer_budget: None,
        }
    }

    /// Caps of a command-buffer API with the given inline upload budget.
    pub const fn command_buffer(budget: usize) -> Self {
        Self {
            native_fans: false,
            native_quads: false,
            native_polygon_mode: false,
            transfer_budget: Some(budget),
        }
    }
}

// ── handles ───────────────────────────────────────────────────────────────

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub fn id(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Compiled pipeline state object.
    PipelineHandle
);
handle!(
    /// Immutable vertex buffer.
    BufferHandle
);
handle!(
    /// Sampled texture, optionally usable as a render target.
    TextureHandle
);

// ── primitive state ───────────────────────────────────────────────────────

/// Primitive topology of a draw as seen by the backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    /// Only issued when `BackendCaps::native_fans` is set.
    TriangleFan,
    /// Only issued when `BackendCaps::native_quads` is set.
    Quads,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// `src * srcAlpha + dst * (1 - srcAlpha)`.
    Alpha,
    /// `src * (1 - dstAlpha) + dst * dstAlpha`.
    InverseDestination,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
}

/// Scissor rectangle in target pixels, top-left origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where draws land.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TargetBinding {
    /// Nothing bound; draws are dropped.
    #[default]
    Detached,
    /// The presentation surface (or the backend's default framebuffer).
    Screen,
    Texture(TextureHandle),
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    /// Single-channel coverage; sampled as alpha.
    R8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8Unorm => 1,
            _ => 4,
        }
    }

    pub fn is_bgra(self) -> bool {
        matches!(self, PixelFormat::Bgra8Unorm | PixelFormat::Bgra8UnormSrgb)
    }

    pub fn is_alpha_only(self) -> bool {
        self == PixelFormat::R8Unorm
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    MirroredRepeat,
    Repeat,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct SamplerParams {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

/// Texture creation parameters. One-dimensional textures use `height == 1`.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_levels: u32,
    pub render_target: bool,
    pub sampler: SamplerParams,
}

impl TextureDesc {
    pub fn level0_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

// ── vertex layouts ────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttrFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepMode {
    Vertex,
    Instance,
}

#[derive(Debug, Copy, Clone)]
pub struct VertexAttr {
    pub location: u32,
    pub format: AttrFormat,
    pub offset: u64,
}

/// One bound vertex stream.
#[derive(Debug, Copy, Clone)]
pub struct StreamLayout {
    pub stride: u64,
    pub step: StepMode,
    pub attributes: &'static [VertexAttr],
}

const fn attr(location: u32, format: AttrFormat, offset: u64) -> VertexAttr {
    VertexAttr {
        location,
        format,
        offset,
    }
}

const fn stream(stride: u64, attributes: &'static [VertexAttr]) -> StreamLayout {
    StreamLayout {
        stride,
        step: StepMode::Vertex,
        attributes,
    }
}

const POS3_ATTRS: &[VertexAttr] = &[attr(0, AttrFormat::Float32x3, 0)];
const POS2_ATTRS: &[VertexAttr] = &[attr(0, AttrFormat::Float32x2, 0)];
const COLOR_F32_ATTRS: &[VertexAttr] = &[attr(1, AttrFormat::Float32x4, 0)];
const COLOR_U8_ATTRS: &[VertexAttr] = &[attr(1, AttrFormat::Unorm8x4, 0)];
const UV_ATTRS: &[VertexAttr] = &[attr(2, AttrFormat::Float32x2, 0)];
const S_ATTRS: &[VertexAttr] = &[attr(2, AttrFormat::Float32, 0)];
const LINE_ATTRS: &[VertexAttr] = &[
    attr(0, AttrFormat::Float32x3, 0),
    attr(3, AttrFormat::Float32, 12),
    attr(4, AttrFormat::Float32x3, 16),
    attr(5, AttrFormat::Float32, 28),
    attr(1, AttrFormat::Unorm8x4, 32),
];
const POLYGON_ATTRS: &[VertexAttr] = &[
    attr(0, AttrFormat::Float32x3, 0),
    attr(1, AttrFormat::Float32x4, 12),
];
const NODE_INSTANCE_ATTRS: &[VertexAttr] = &[
    attr(3, AttrFormat::Float32x2, 0),
    attr(4, AttrFormat::Float32, 8),
    attr(1, AttrFormat::Unorm8x4, 12),
];

const POS3: StreamLayout = stream(12, POS3_ATTRS);
const POS2: StreamLayout = stream(8, POS2_ATTRS);
const COLOR_F32: StreamLayout = stream(16, COLOR_F32_ATTRS);
const COLOR_U8: StreamLayout = stream(4, COLOR_U8_ATTRS);
const UV: StreamLayout = stream(8, UV_ATTRS);
const S: StreamLayout = stream(4, S_ATTRS);
const LINE: StreamLayout = stream(36, LINE_ATTRS);
const POLYGON: StreamLayout = stream(28, POLYGON_ATTRS);
const NODE_INSTANCE: StreamLayout = StreamLayout {
    stride: 16,
    step: StepMode::Instance,
    attributes: NODE_INSTANCE_ATTRS,
};

/// Vertex input shape of a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexLayout {
    Plain3D,
    Color3D,
    Texture3D,
    Plain2D,
    Color2D,
    Color2DByte,
    Texture1D,
    /// Interleaved extruded line vertex, see [`crate::lines::LineVertex`].
    Line,
    /// Interleaved position + float color for stippled polygons.
    Polygon,
    /// Disc mesh plus per-instance center/radius/color.
    TreeNode,
}

impl VertexLayout {
    pub fn streams(self) -> &'static [StreamLayout] {
        match self {
            VertexLayout::Plain3D => &[POS3],
            VertexLayout::Color3D => &[POS3, COLOR_F32],
            VertexLayout::Texture3D => &[POS3, UV],
            VertexLayout::Plain2D => &[POS2],
            VertexLayout::Color2D => &[POS2, COLOR_F32],
            VertexLayout::Color2DByte => &[POS2, COLOR_U8],
            VertexLayout::Texture1D => &[POS2, S],
            VertexLayout::Line => &[LINE],
            VertexLayout::Polygon => &[POLYGON],
            VertexLayout::TreeNode => &[POS2, NODE_INSTANCE],
        }
    }

    /// Bytes of vertex data one vertex costs against the transfer budget.
    pub fn element_size(self) -> usize {
        self.streams()
            .iter()
            .filter(|s| s.step == StepMode::Vertex)
            .map(|s| s.stride as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Everything a backend needs to compile one pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub label: String,
    pub vertex_fn: &'static str,
    pub fragment_fn: &'static str,
    pub layout: VertexLayout,
    pub blend: BlendMode,
    pub color_format: PixelFormat,
}

// ── draw calls ────────────────────────────────────────────────────────────

/// Per-draw uniform block shared by every shader entry point.
///
/// `params` = (point size, texture modulate, line width, stipple factor).
/// `stipple.x` holds the 16-bit line pattern, `stipple.y` the smoothing feather.
/// `polygon_stipple` packs the 32x32 mask one row per `u32`, MSB leftmost.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub viewport: [f32; 4],
    pub params: [f32; 4],
    pub stipple: [f32; 4],
    pub polygon_stipple: [[u32; 4]; 8],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            transform: glam::Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0; 4],
            viewport: [0.0; 4],
            params: [1.0, 1.0, 1.0, 1.0],
            stipple: [0.0; 4],
            polygon_stipple: [[u32::MAX; 4]; 8],
        }
    }
}

/// Vertex data for one stream of a draw.
#[derive(Debug, Copy, Clone)]
pub enum VertexSource<'a> {
    /// Inline bytes, uploaded by the backend for this draw only.
    Bytes(&'a [u8]),
    /// A previously created buffer, starting at `offset` bytes.
    Buffer { handle: BufferHandle, offset: u64 },
}

#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub pipeline: PipelineHandle,
    pub topology: Topology,
    pub uniforms: DrawUniforms,
    /// One entry per stream of the pipeline's layout, in order.
    pub streams: Vec<VertexSource<'a>>,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub texture: Option<TextureHandle>,
    pub fill: FillMode,
    pub depth_test: bool,
}

/// A graphics backend.
///
/// Handles are only meaningful to the backend that issued them. Releasing an
/// unknown handle is ignored. Drawing with an unknown handle logs and skips.
pub trait Backend: Send + Sync {
    fn api(&self) -> Api;

    fn caps(&self) -> BackendCaps;

    /// Compiles a pipeline. Fails with [`crate::RenderError::MissingFunction`]
    /// when a shader entry point does not exist.
    fn compile_pipeline(&self, desc: &PipelineDesc) -> Result<PipelineHandle>;

    fn release_pipeline(&self, handle: PipelineHandle);

    fn create_buffer(&self, label: &str, contents: &[u8]) -> Result<BufferHandle>;

    fn release_buffer(&self, handle: BufferHandle);

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle>;

    /// Replaces mip level 0. `data` must hold exactly `width * height` texels.
    fn write_texture(&self, handle: TextureHandle, data: &[u8]) -> Result<()>;

    fn set_sampler(&self, handle: TextureHandle, sampler: SamplerParams);

    /// Reads mip level 0 back as tightly packed RGBA rows, top row first.
    ///
    /// Blocks until the GPU has finished every submitted draw.
    fn read_texture(&self, handle: TextureHandle) -> Result<Vec<u8>>;

    /// Rebuilds every mip level below 0 and waits for completion.
    fn generate_mipmaps(&self, handle: TextureHandle) -> Result<()>;

    fn release_texture(&self, handle: TextureHandle);

    /// Redirects subsequent draws; returns the previous binding.
    ///
    /// Pending work for the previous target is flushed first.
    fn bind_target(&self, target: TargetBinding) -> TargetBinding;

    fn has_target(&self) -> bool;

    fn set_scissor(&self, rect: Option<ScissorRect>);

    /// Clears the bound target's color and/or depth.
    fn clear(&self, color: Option<[f32; 4]>, depth: bool);

    fn draw(&self, call: &DrawCall<'_>);

    /// Submits everything recorded so far.
    fn flush(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<DrawUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 256);
    }

    #[test]
    fn element_size_ignores_instance_streams() {
        assert_eq!(VertexLayout::TreeNode.element_size(), 8);
        assert_eq!(VertexLayout::Color3D.element_size(), 16);
        assert_eq!(VertexLayout::Plain3D.element_size(), 12);
        assert_eq!(VertexLayout::Line.element_size(), 36);
    }

    #[test]
    fn layout_strides_cover_attributes() {
        let layouts = [
            VertexLayout::Plain3D,
            VertexLayout::Color3D,
            VertexLayout::Texture3D,
            VertexLayout::Plain2D,
            VertexLayout::Color2D,
            VertexLayout::Color2DByte,
            VertexLayout::Texture1D,
            VertexLayout::Line,
            VertexLayout::Polygon,
            VertexLayout::TreeNode,
        ];
        for layout in layouts {
            for s in layout.streams() {
                for a in s.attributes {
                    let size = match a.format {
                        AttrFormat::Float32 | AttrFormat::Unorm8x4 => 4,
                        AttrFormat::Float32x2 => 8,
                        AttrFormat::Float32x3 => 12,
                        AttrFormat::Float32x4 => 16,
                    };
                    assert!(a.offset + size <= s.stride, "{layout:?} attr {}", a.location);
                }
            }
        }
    }
}
