//! Fixed-function render state and the enums that address it.

use crate::backend::{BlendMode, FillMode, ScissorRect, TextureHandle};
use crate::color::Rgba;
use crate::lines::{LineStipple, LineStyle};
use crate::math::{MatrixMode, MatrixStack};

/// Toggles accepted by `enable`/`disable`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    LineSmooth,
    LineStipple,
    PolygonStipple,
    ScissorTest,
    Texture1D,
    Texture2D,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// The two factor pairs the pipeline catalog compiles.
    pub fn blend_mode(src: BlendFactor, dst: BlendFactor) -> Option<BlendMode> {
        match (src, dst) {
            (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha) => Some(BlendMode::Alpha),
            (BlendFactor::OneMinusDstAlpha, BlendFactor::DstAlpha) => {
                Some(BlendMode::InverseDestination)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TexEnvTarget {
    TextureEnv,
    TextureFilterControl,
    PointSprite,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TexEnvName {
    Mode,
    Color,
    LodBias,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TexEnvMode {
    Modulate,
    Replace,
    Decal,
    Blend,
    Add,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PolygonMode {
    Point,
    Line,
    Fill,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShadeModel {
    Flat,
    Smooth,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HintTarget {
    LineSmooth,
    PolygonSmooth,
    PerspectiveCorrection,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HintMode {
    Fastest,
    Nicest,
    DontCare,
}

/// Texture bound for sampling by textured draws.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BoundTexture {
    pub handle: TextureHandle,
    /// Single-channel coverage texture; selects the alpha pipeline variant.
    pub alpha_only: bool,
}

/// State read when a draw is flushed.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub matrix_mode: MatrixMode,
    pub model_view: MatrixStack,
    pub projection: MatrixStack,

    pub blend_enabled: bool,
    pub blend_mode: BlendMode,
    pub depth_test: bool,

    pub line_width: f32,
    pub line_smooth: bool,
    pub line_stipple_enabled: bool,
    pub line_stipple: LineStipple,
    pub point_size: f32,

    pub fill_mode: FillMode,
    pub polygon_stipple_enabled: bool,
    /// 32x32 bits, four bytes per row, bottom row first.
    pub polygon_stipple: [u8; 128],

    pub scissor_enabled: bool,
    /// Top-left origin, in target pixels.
    pub scissor: ScissorRect,

    pub current_color: Rgba,
    pub clear_color: Rgba,
    pub tex_modulate: bool,
    pub texture_1d: bool,
    pub texture_2d: bool,
    pub bound_texture: Option<BoundTexture>,

    /// x, y, width, height in window pixels, bottom-left origin.
    pub viewport: [f64; 4],
    /// Logical size of the surface being drawn to.
    pub client_size: (u32, u32),
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            matrix_mode: MatrixMode::ModelView,
            model_view: MatrixStack::new(),
            projection: MatrixStack::new(),
            blend_enabled: false,
            blend_mode: BlendMode::Alpha,
            depth_test: false,
            line_width: 1.0,
            line_smooth: false,
            line_stipple_enabled: false,
            line_stipple: LineStipple {
                factor: 1,
                pattern: 0xFFFF,
            },
            point_size: 1.0,
            fill_mode: FillMode::Fill,
            polygon_stipple_enabled: false,
            polygon_stipple: [0xFF; 128],
            scissor_enabled: false,
            scissor: ScissorRect {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            },
            current_color: Rgba::WHITE,
            clear_color: Rgba::TRANSPARENT,
            tex_modulate: true,
            texture_1d: false,
            texture_2d: false,
            bound_texture: None,
            viewport: [0.0; 4],
            client_size: (0, 0),
        }
    }
}

impl RenderState {
    pub fn stack(&self) -> &MatrixStack {
        match self.matrix_mode {
            MatrixMode::ModelView => &self.model_view,
            MatrixMode::Projection => &self.projection,
        }
    }

    pub fn stack_mut(&mut self) -> &mut MatrixStack {
        match self.matrix_mode {
            MatrixMode::ModelView => &mut self.model_view,
            MatrixMode::Projection => &mut self.projection,
        }
    }

    pub fn is_enabled(&self, cap: Capability) -> bool {
        match cap {
            Capability::Blend => self.blend_enabled,
            Capability::DepthTest => self.depth_test,
            Capability::LineSmooth => self.line_smooth,
            Capability::LineStipple => self.line_stipple_enabled,
            Capability::PolygonStipple => self.polygon_stipple_enabled,
            Capability::ScissorTest => self.scissor_enabled,
            Capability::Texture1D => self.texture_1d,
            Capability::Texture2D => self.texture_2d,
        }
    }

    pub(crate) fn set_flag(&mut self, cap: Capability, on: bool) {
        let flag = match cap {
            Capability::Blend => &mut self.blend_enabled,
            Capability::DepthTest => &mut self.depth_test,
            Capability::LineSmooth => &mut self.line_smooth,
            Capability::LineStipple => &mut self.line_stipple_enabled,
            Capability::PolygonStipple => &mut self.polygon_stipple_enabled,
            Capability::ScissorTest => &mut self.scissor_enabled,
            Capability::Texture1D => &mut self.texture_1d,
            Capability::Texture2D => &mut self.texture_2d,
        };
        *flag = on;
    }

    pub fn texturing(&self) -> bool {
        self.texture_1d || self.texture_2d
    }

    pub fn line_style(&self) -> LineStyle {
        LineStyle {
            width: self.line_width,
            smooth: self.line_smooth,
            stipple: self.line_stipple_enabled.then_some(self.line_stipple),
        }
    }

    /// Full-target scissor for the current client size.
    pub fn full_scissor(&self) -> ScissorRect {
        ScissorRect {
            x: 0,
            y: 0,
            width: self.client_size.0,
            height: self.client_size.1,
        }
    }

    /// Mask rows packed MSB-first, top row first.
    pub fn packed_polygon_stipple(&self) -> [[u32; 4]; 8] {
        let mut rows = [[0u32; 4]; 8];
        for (r, bytes) in self.polygon_stipple.chunks_exact(4).enumerate() {
            let top = 31 - r;
            rows[top / 4][top % 4] = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        rows
    }
}
