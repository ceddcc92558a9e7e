use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage};
use kiln_render::geometry::{
    DrawMode, FillerPoint, GeometryBuffer, NarrowEdge, NodeInstance, TreeNodeGeometry,
};
use kiln_render::immediate::{BlendFactor, Capability};
use kiln_render::math::MatrixMode;
use kiln_render::pane::{ProjectionMode, ViewportRect};
use kiln_render::{FrameBuffer, ImmediateRenderer, Pane, ResourceManager, Texture};

/// Everything the demo draws each frame.
pub struct Scene {
    ribbon: Arc<GeometryBuffer>,
    edges: NarrowEdge,
    fillers: FillerPoint,
    node: TreeNodeGeometry,
    gradient: Texture,
    badge: Texture,
    offscreen: FrameBuffer,
    offscreen_ready: bool,
    /// Window area in pixel mode.
    screen: Pane,
}

impl Scene {
    pub fn new(manager: &ResourceManager) -> Result<Self> {
        let mut ribbon = manager.create_geometry("ribbon", DrawMode::TriangleStrip);
        let (positions, colors) = ribbon_mesh(24);
        ribbon.set_vertices_2d(&positions);
        ribbon.set_colors_u8(&colors)?;
        ribbon.upload()?;
        let ribbon = Arc::new(ribbon);

        let gradient = manager.create_texture_1d_rgba(
            "gradient",
            &[
                0.9, 0.2, 0.2, 1.0, //
                0.9, 0.8, 0.2, 1.0, //
                0.2, 0.8, 0.3, 1.0, //
                0.2, 0.4, 0.9, 1.0,
            ],
        )?;

        let badge = manager
            .create_texture("badge", DynamicImage::ImageRgba8(badge_image(32)))
            .with_mipmaps(true);

        let mut screen = Pane::new();
        screen.set_exact_ortho(true);

        Ok(Self {
            edges: manager.create_narrow_edge(&ribbon),
            fillers: manager.create_filler_points(&ribbon),
            ribbon,
            node: manager.create_tree_node(0)?,
            gradient,
            badge,
            offscreen: manager.create_framebuffer(128)?,
            offscreen_ready: false,
            screen,
        })
    }

    /// Draws one frame into whatever target the backend has bound.
    pub fn draw(
        &mut self,
        r: &mut ImmediateRenderer,
        width: u32,
        height: u32,
        seconds: f64,
    ) -> Result<()> {
        if !self.offscreen_ready {
            self.offscreen.render(r, |r| {
                pixel_projection(r, 128.0, 128.0);
                r.clear_color(0.1, 0.1, 0.15, 1.0);
                r.clear(true, false);
                checkerboard(r, 8, 16.0);
            })?;
            self.offscreen.generate_mipmaps()?;
            self.offscreen_ready = true;
        }

        r.set_client_size(width, height);
        self.screen.set_viewport(ViewportRect::new(0, 0, width as i32, height as i32));
        if !self.screen.open(r, ProjectionMode::Pixels) {
            return Ok(());
        }
        r.load_identity();
        r.clear_color(0.08, 0.08, 0.1, 1.0);
        r.clear(true, false);

        self.draw_fan(r, seconds);
        self.draw_lines(r);
        self.draw_textured(r);
        self.draw_ribbon(r);
        self.draw_nodes(r, seconds);

        self.screen.close(r);
        r.flush()?;
        Ok(())
    }

    fn draw_fan(&self, r: &mut ImmediateRenderer, seconds: f64) {
        r.push_matrix();
        r.translated(120.0, 120.0, 0.0);
        r.rotated(seconds * 45.0, 0.0, 0.0, 1.0);
        r.begin(DrawMode::TriangleFan);
        r.color3f(1.0, 1.0, 1.0);
        r.vertex2f(0.0, 0.0);
        for i in 0..=6 {
            let a = i as f32 * std::f32::consts::TAU / 6.0;
            r.color3ub((i * 40) as u8, 120, 255 - (i * 30) as u8);
            r.vertex2f(a.cos() * 80.0, a.sin() * 80.0);
        }
        r.end();
        r.pop_matrix();
    }

    fn draw_lines(&self, r: &mut ImmediateRenderer) {
        r.enable(Capability::Blend);
        r.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        r.enable(Capability::LineSmooth);
        r.line_width(3.0);
        r.color4f(1.0, 0.85, 0.3, 1.0);
        r.begin(DrawMode::LineLoop);
        for i in 0..10 {
            let a = i as f64 * std::f64::consts::PI / 5.0;
            let radius = if i % 2 == 0 { 90.0 } else { 40.0 };
            r.vertex2d(360.0 + a.cos() * radius, 120.0 + a.sin() * radius);
        }
        r.end();
        r.disable(Capability::LineSmooth);

        r.enable(Capability::LineStipple);
        r.line_stipple(2, 0x0F0F);
        r.line_width(1.5);
        r.color3f(0.6, 0.9, 1.0);
        r.begin(DrawMode::LineStrip);
        for i in 0..40 {
            let x = 40.0 + i as f32 * 15.0;
            r.vertex2f(x, 260.0 + (i as f32 * 0.5).sin() * 20.0);
        }
        r.end();
        r.disable(Capability::LineStipple);
        r.disable(Capability::Blend);
    }

    fn draw_textured(&mut self, r: &mut ImmediateRenderer) {
        r.color3f(1.0, 1.0, 1.0);

        r.bind_texture(Some(self.offscreen.bound_texture()));
        r.enable(Capability::Texture2D);
        r.begin(DrawMode::Quads);
        r.tex_coord2f(0.0, 0.0);
        r.vertex2f(480.0, 40.0);
        r.tex_coord2f(1.0, 0.0);
        r.vertex2f(608.0, 40.0);
        r.tex_coord2f(1.0, 1.0);
        r.vertex2f(608.0, 168.0);
        r.tex_coord2f(0.0, 1.0);
        r.vertex2f(480.0, 168.0);
        r.end();

        r.enable(Capability::Blend);
        r.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        self.badge.bind(r);
        r.begin(DrawMode::Quads);
        r.tex_coord2f(0.0, 0.0);
        r.vertex2f(440.0, 190.0);
        r.tex_coord2f(1.0, 0.0);
        r.vertex2f(504.0, 190.0);
        r.tex_coord2f(1.0, 1.0);
        r.vertex2f(504.0, 254.0);
        r.tex_coord2f(0.0, 1.0);
        r.vertex2f(440.0, 254.0);
        r.end();
        r.disable(Capability::Blend);
        r.disable(Capability::Texture2D);

        self.gradient.bind(r);
        r.enable(Capability::Texture1D);
        r.begin(DrawMode::Quads);
        r.tex_coord1f(0.0);
        r.vertex2f(40.0, 300.0);
        r.tex_coord1f(1.0);
        r.vertex2f(620.0, 300.0);
        r.vertex2f(620.0, 330.0);
        r.tex_coord1f(0.0);
        r.vertex2f(40.0, 330.0);
        r.end();
        r.disable(Capability::Texture1D);
        r.bind_texture(None);
    }

    fn draw_ribbon(&self, r: &mut ImmediateRenderer) {
        r.push_matrix();
        r.translatef(40.0, 360.0, 0.0);
        r.draw_geometry(&self.ribbon);
        r.color3f(0.0, 0.0, 0.0);
        self.edges.draw(r);
        r.point_size(4.0);
        r.color3f(1.0, 1.0, 1.0);
        self.fillers.draw(r);
        r.pop_matrix();
    }

    fn draw_nodes(&self, r: &mut ImmediateRenderer, seconds: f64) {
        let phase = seconds as f32;
        let instances: Vec<NodeInstance> = (0..64)
            .map(|i| {
                let a = i as f32 * 0.35 + phase * 0.5;
                let d = 20.0 + i as f32 * 2.5;
                NodeInstance {
                    center: [520.0 + a.cos() * d, 420.0 + a.sin() * d],
                    radius: 3.0 + (i % 5) as f32,
                    color: [255, (i * 4) as u8, 80, 255],
                }
            })
            .collect();
        self.node.draw(r, &instances);
    }
}

/// Pixel coordinates with the origin at the bottom-left.
fn pixel_projection(r: &mut ImmediateRenderer, width: f64, height: f64) {
    r.matrix_mode(MatrixMode::Projection);
    r.load_identity();
    r.ortho(0.0, width, 0.0, height, -1.0, 1.0);
    r.matrix_mode(MatrixMode::ModelView);
    r.load_identity();
}

fn checkerboard(r: &mut ImmediateRenderer, cells: u32, size: f32) {
    r.begin(DrawMode::Quads);
    for y in 0..cells {
        for x in 0..cells {
            if (x + y) % 2 == 0 {
                r.color3f(0.9, 0.4, 0.2);
            } else {
                r.color3f(0.2, 0.5, 0.9);
            }
            let (x0, y0) = (x as f32 * size, y as f32 * size);
            r.vertex2f(x0, y0);
            r.vertex2f(x0 + size, y0);
            r.vertex2f(x0 + size, y0 + size);
            r.vertex2f(x0, y0 + size);
        }
    }
    r.end();
}

/// Soft-edged disc on a transparent background.
fn badge_image(size: u32) -> RgbaImage {
    let c = (size as f32 - 1.0) / 2.0;
    RgbaImage::from_fn(size, size, |x, y| {
        let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt() / c;
        let alpha = ((1.0 - d) * 4.0).clamp(0.0, 1.0);
        Rgba([250, 230, 120, (alpha * 255.0) as u8])
    })
}

/// Zig-zag strip along a sine wave with a color ramp.
fn ribbon_mesh(columns: usize) -> (Vec<[f32; 2]>, Vec<[u8; 4]>) {
    let mut positions = Vec::with_capacity(columns * 2);
    let mut colors = Vec::with_capacity(columns * 2);
    for i in 0..columns {
        let x = i as f32 * 16.0;
        let y = (i as f32 * 0.4).sin() * 30.0;
        let shade = (i * 255 / columns.max(1)) as u8;
        positions.push([x, y]);
        positions.push([x, y + 40.0]);
        colors.push([shade, 90, 255 - shade, 255]);
        colors.push([shade, 180, 255 - shade, 255]);
    }
    (positions, colors)
}
