//! A rectangular drawing area that maps a window viewport onto a region of
//! model space.
//!
//! A [`Pane`] owns three rectangles: the viewport in window pixels, the
//! model-space limits of the data and the visible model region. Zooming and
//! scrolling move the visible region and keep it inside the limits under the
//! configured [`Adjust`] rules. [`Pane::open`] loads the matching projection
//! into a renderer and captures the matrices that [`Pane::project`] and
//! [`Pane::unproject`] use afterwards.

use glam::{DMat4, DVec2, DVec3};

use crate::immediate::{Capability, ImmediateRenderer};
use crate::math::MatrixMode;

/// Window-pixel rectangle with a bottom-left origin.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ViewportRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(self) -> i32 {
        self.x + self.width
    }

    pub fn top(self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlap of both rectangles; empty when they do not meet.
    pub fn intersect(self, other: ViewportRect) -> ViewportRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.top().min(other.top());
        ViewportRect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}

/// Model-space rectangle. Edges may be reversed to flip an axis.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ModelRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl ModelRect {
    pub const fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn width(self) -> f64 {
        self.right - self.left
    }

    pub fn height(self) -> f64 {
        self.top - self.bottom
    }

    pub fn center(self) -> DVec2 {
        DVec2::new((self.left + self.right) / 2.0, (self.bottom + self.top) / 2.0)
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        self.left += dx;
        self.right += dx;
        self.bottom += dy;
        self.top += dy;
    }

    fn set_x(&mut self, left: f64, right: f64) {
        self.left = left;
        self.right = right;
    }

    fn set_y(&mut self, bottom: f64, top: f64) {
        self.bottom = bottom;
        self.top = top;
    }
}

/// Projection loaded by [`Pane::open`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProjectionMode {
    /// The visible model rectangle fills the viewport.
    Ortho,
    /// One unit per window pixel.
    Pixels,
}

/// Which edge of the visible rectangle stays put on one axis.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Anchor {
    /// Left or bottom.
    #[default]
    Start,
    Center,
    /// Right or top.
    End,
}

/// Limit rules applied after every zoom or viewport change.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Adjust {
    /// The visible extent never exceeds the limits.
    pub scale_to_limits: bool,
    /// The visible rectangle is moved back inside the limits.
    pub shift_to_limits: bool,
}

impl Adjust {
    pub const ALL: Adjust = Adjust {
        scale_to_limits: true,
        shift_to_limits: true,
    };
    pub const NONE: Adjust = Adjust {
        scale_to_limits: false,
        shift_to_limits: false,
    };
}

impl Default for Adjust {
    fn default() -> Self {
        Self::ALL
    }
}

/// Axes a zoom call acts on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ZoomAxes {
    pub x: bool,
    pub y: bool,
    /// Zoom even an axis whose zooming is disabled. Only `zoom_all` reads it.
    pub force: bool,
}

impl ZoomAxes {
    pub const X: ZoomAxes = ZoomAxes {
        x: true,
        y: false,
        force: false,
    };
    pub const Y: ZoomAxes = ZoomAxes {
        x: false,
        y: true,
        force: false,
    };
    pub const BOTH: ZoomAxes = ZoomAxes {
        x: true,
        y: true,
        force: false,
    };
}

#[derive(Debug, Clone)]
pub struct Pane {
    viewport: ViewportRect,
    limits: ModelRect,
    visible: ModelRect,
    /// Visible rectangle before proportional adjustment.
    orig_visible: ModelRect,
    clip: Option<ViewportRect>,
    mode: Option<ProjectionMode>,
    adjust_x: Adjust,
    adjust_y: Adjust,
    /// Ortho projection starts at the visible origin instead of model zero.
    enable_offset: bool,
    exact_ortho: bool,
    zoom_x: bool,
    zoom_y: bool,
    zoom_factor: f64,
    proportional: bool,
    anchor_x: Anchor,
    anchor_y: Anchor,
    min_scale: DVec2,
    /// Window matrix times projection times model-view, captured at open.
    to_window: DMat4,
}

impl Default for Pane {
    fn default() -> Self {
        Self {
            viewport: ViewportRect::default(),
            limits: ModelRect::default(),
            visible: ModelRect::default(),
            orig_visible: ModelRect::default(),
            clip: None,
            mode: None,
            adjust_x: Adjust::ALL,
            adjust_y: Adjust::ALL,
            enable_offset: false,
            exact_ortho: false,
            zoom_x: true,
            zoom_y: true,
            zoom_factor: 2.0,
            proportional: false,
            anchor_x: Anchor::Start,
            anchor_y: Anchor::Start,
            min_scale: DVec2::ZERO,
            to_window: DMat4::IDENTITY,
        }
    }
}

impl Pane {
    pub fn new() -> Self {
        Self::default()
    }

    // ── configuration ─────────────────────────────────────────────────────

    pub fn viewport(&self) -> ViewportRect {
        self.viewport
    }

    /// Sets the window area and re-applies the scale and limit rules.
    pub fn set_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = ViewportRect {
            width: viewport.width.max(0),
            height: viewport.height.max(0),
            ..viewport
        };
        self.apply_rules(self.orig_visible.center());
    }

    pub fn limits(&self) -> ModelRect {
        self.limits
    }

    pub fn set_limits(&mut self, limits: ModelRect) {
        self.limits = limits;
    }

    pub fn visible_rect(&self) -> ModelRect {
        self.visible
    }

    /// Replaces the visible rectangle without applying any rule.
    pub fn set_visible_rect(&mut self, rect: ModelRect) {
        self.visible = rect;
        self.orig_visible = rect;
    }

    /// Extra window clip intersected with the viewport on open.
    pub fn set_clip_rect(&mut self, clip: Option<ViewportRect>) {
        self.clip = clip;
    }

    pub fn set_adjust(&mut self, x: Adjust, y: Adjust) {
        self.adjust_x = x;
        self.adjust_y = y;
    }

    pub fn set_anchors(&mut self, x: Anchor, y: Anchor) {
        self.anchor_x = x;
        self.anchor_y = y;
    }

    pub fn enable_zoom(&mut self, x: bool, y: bool) {
        self.zoom_x = x;
        self.zoom_y = y;
    }

    pub fn set_zoom_factor(&mut self, factor: f64) {
        self.zoom_factor = factor;
    }

    /// Keeps both axes at the same scale, the coarser of the two.
    pub fn set_proportional(&mut self, on: bool) {
        self.proportional = on;
    }

    /// Smallest model units per pixel. Zero disables the bound.
    pub fn set_min_scale(&mut self, x: f64, y: f64) {
        self.min_scale = DVec2::new(x, y);
    }

    pub fn enable_offset(&mut self, on: bool) {
        self.enable_offset = on;
    }

    /// Pixel projection without the half-pixel border.
    pub fn set_exact_ortho(&mut self, on: bool) {
        self.exact_ortho = on;
    }

    /// Model units per pixel.
    pub fn scale(&self) -> DVec2 {
        DVec2::new(
            self.visible.width() / f64::from(self.viewport.width.max(1)),
            self.visible.height() / f64::from(self.viewport.height.max(1)),
        )
    }

    /// Scale at which the whole limits rectangle fits the viewport.
    pub fn zoom_all_scale(&self) -> DVec2 {
        DVec2::new(
            self.limits.width() / f64::from(self.viewport.width.max(1)),
            self.limits.height() / f64::from(self.viewport.height.max(1)),
        )
    }

    // ── open / close ──────────────────────────────────────────────────────

    pub fn mode(&self) -> Option<ProjectionMode> {
        self.mode
    }

    /// Loads the viewport, scissor and projection for `mode` into `r`.
    ///
    /// Returns false, leaving `r` untouched, when the pane is already open
    /// or its viewport is empty.
    pub fn open(&mut self, r: &mut ImmediateRenderer, mode: ProjectionMode) -> bool {
        if self.mode.is_some() {
            log::warn!("pane opened twice");
            return false;
        }
        if self.viewport.is_empty() {
            log::debug!("pane with an empty viewport not opened");
            return false;
        }

        let vp = self.viewport;
        r.viewport(vp.x, vp.y, vp.width, vp.height);
        r.enable(Capability::ScissorTest);
        let clip = self.clip.map_or(vp, |c| vp.intersect(c));
        r.scissor(clip.x, clip.y, clip.width, clip.height);

        r.matrix_mode(MatrixMode::Projection);
        r.load_identity();
        match mode {
            ProjectionMode::Ortho => {
                let v = self.visible;
                if self.enable_offset {
                    r.ortho(0.0, v.width(), 0.0, v.height(), -1.0, 1.0);
                } else {
                    r.ortho(v.left, v.right, v.bottom, v.top, -1.0, 1.0);
                }
            }
            ProjectionMode::Pixels => {
                let (l, b) = (f64::from(vp.x), f64::from(vp.y));
                let (rt, t) = (f64::from(vp.right()), f64::from(vp.top()));
                if self.exact_ortho {
                    r.ortho(l, rt, b, t, -1.0, 1.0);
                } else {
                    r.ortho(l - 0.5, rt + 0.5, b - 0.5, t + 0.5, -1.0, 1.0);
                }
            }
        }
        r.matrix_mode(MatrixMode::ModelView);

        self.to_window = r.window_matrix() * r.projection_matrix() * r.model_view_matrix();
        self.mode = Some(mode);
        true
    }

    pub fn close(&mut self, r: &mut ImmediateRenderer) {
        if self.mode.take().is_none() {
            log::warn!("closing a pane that is not open");
            return;
        }
        r.matrix_mode(MatrixMode::Projection);
        r.disable(Capability::ScissorTest);
    }

    // ── project / unproject ───────────────────────────────────────────────

    /// Model point to window pixels, using the matrices captured at open.
    pub fn project(&self, x: f64, y: f64) -> DVec2 {
        let (x, y) = if self.enable_offset {
            (x - self.visible.left, y - self.visible.bottom)
        } else {
            (x, y)
        };
        self.to_window.transform_point3(DVec3::new(x, y, 0.0)).truncate()
    }

    pub fn project_x(&self, x: f64) -> f64 {
        self.project(x, if self.enable_offset { self.visible.bottom } else { 0.0 }).x
    }

    pub fn project_y(&self, y: f64) -> f64 {
        self.project(if self.enable_offset { self.visible.left } else { 0.0 }, y).y
    }

    /// Window pixels back to model space.
    pub fn unproject(&self, x: f64, y: f64) -> DVec2 {
        let p = self.to_window.inverse().transform_point3(DVec3::new(x, y, 0.0)).truncate();
        if self.enable_offset {
            p + DVec2::new(self.visible.left, self.visible.bottom)
        } else {
            p
        }
    }

    /// Model width covered by `pixels` window pixels.
    pub fn unproject_width(&self, pixels: f64) -> f64 {
        self.unproject(pixels, 0.0).x - self.unproject(0.0, 0.0).x
    }

    /// Model height covered by `pixels` window pixels.
    pub fn unproject_height(&self, pixels: f64) -> f64 {
        self.unproject(0.0, pixels).y - self.unproject(0.0, 0.0).y
    }

    // ── zoom ──────────────────────────────────────────────────────────────

    pub fn is_zoom_in_available(&self) -> bool {
        self.zoom_x || self.zoom_y
    }

    pub fn is_zoom_out_available(&self) -> bool {
        let x = self.visible.width().abs() < self.limits.width().abs();
        let y = self.visible.height().abs() < self.limits.height().abs();
        (self.zoom_x && x) || (self.zoom_y && y)
    }

    /// Shows the whole limits rectangle on the selected axes.
    pub fn zoom_all(&mut self, axes: ZoomAxes) {
        if axes.x && (self.zoom_x || axes.force) {
            self.visible.set_x(self.limits.left, self.limits.right);
            self.orig_visible.set_x(self.limits.left, self.limits.right);
        }
        if axes.y && (self.zoom_y || axes.force) {
            self.visible.set_y(self.limits.bottom, self.limits.top);
            self.orig_visible.set_y(self.limits.bottom, self.limits.top);
        }
        self.correct_scale(self.orig_visible.center());
        self.adjust_visible_rect();
    }

    /// Zooms by `factor` around a model point. Factors above one zoom in.
    pub fn zoom_point(&mut self, x: f64, y: f64, factor: f64, axes: ZoomAxes) {
        if !(0.01..100.0).contains(&factor) {
            log::warn!("zoom factor {factor} out of range");
            return;
        }
        self.orig_visible = self.visible;
        if axes.x && self.zoom_x {
            let w = self.visible.width() / factor;
            let left = x - w / 2.0;
            self.orig_visible.set_x(left, left + w);
        }
        if axes.y && self.zoom_y {
            let h = self.visible.height() / factor;
            let bottom = y - h / 2.0;
            self.orig_visible.set_y(bottom, bottom + h);
        }
        self.visible = self.orig_visible;
        self.apply_rules(self.orig_visible.center());
    }

    pub fn zoom_in(&mut self, at: DVec2, axes: ZoomAxes) {
        self.zoom_point(at.x, at.y, self.zoom_factor, axes);
    }

    pub fn zoom_out(&mut self, at: DVec2, axes: ZoomAxes) {
        self.zoom_point(at.x, at.y, 1.0 / self.zoom_factor, axes);
    }

    pub fn zoom_in_center(&mut self, axes: ZoomAxes) {
        self.zoom_in(self.visible.center(), axes);
    }

    pub fn zoom_out_center(&mut self, axes: ZoomAxes) {
        self.zoom_out(self.visible.center(), axes);
    }

    pub fn zoom_rect(&mut self, rect: ModelRect) {
        self.set_visible_rect(rect);
        self.apply_rules(self.visible.center());
    }

    /// Sets model units per pixel around `center`.
    pub fn set_scale(&mut self, scale_x: f64, scale_y: f64, center: DVec2) {
        let w = f64::from(self.viewport.width.abs()) * scale_x;
        let left = center.x - w / 2.0;
        self.orig_visible.set_x(left, left + w);

        let h = f64::from(self.viewport.height.abs()) * scale_y;
        let bottom = center.y - h / 2.0;
        self.orig_visible.set_y(bottom, bottom + h);

        self.visible = self.orig_visible;
        self.apply_rules(center);
    }

    /// Sets the scale keeping `reference` at the same window position.
    pub fn set_scale_ref_point(&mut self, scale_x: f64, scale_y: f64, reference: DVec2) {
        const EPSILON: f64 = 1e-4;

        let w = f64::from(self.viewport.width.abs()) * scale_x;
        let width = self.visible.width().max(EPSILON);
        let left = reference.x - w * (reference.x - self.visible.left) / width;
        self.orig_visible.set_x(left, left + w);

        let h = f64::from(self.viewport.height.abs()) * scale_y;
        let mut height = self.visible.height();
        if height.abs() < EPSILON {
            height = if height > 0.0 { EPSILON } else { -EPSILON };
        }
        let bottom = reference.y - h * (reference.y - self.visible.bottom) / height;
        self.orig_visible.set_y(bottom, bottom + h);

        self.visible = self.orig_visible;
        self.apply_rules(self.visible.center());
    }

    // ── scroll ────────────────────────────────────────────────────────────

    pub fn needs_scroll_x(&self) -> bool {
        self.visible.left > self.limits.left || self.visible.right < self.limits.right
    }

    pub fn needs_scroll_y(&self) -> bool {
        self.visible.height().abs() < self.limits.height().abs()
    }

    pub fn scroll(&mut self, dx: f64, dy: f64) {
        self.orig_visible.offset(dx, dy);
        self.visible.offset(dx, dy);
        self.shift_to_fit_limits();
    }

    /// Places `pos` at fraction (`fx`, `fy`) of the visible rectangle, then
    /// pushes the rectangle back inside the limits without resizing it.
    pub fn scroll_to(&mut self, pos: DVec2, fx: f64, fy: f64) {
        let (w, h) = (self.visible.width(), self.visible.height());
        let left = pos.x - w * fx;
        let bottom = pos.y - h * fy;
        self.visible = ModelRect::new(left, bottom, left + w, bottom + h);

        let l = self.limits;
        if self.visible.left < l.left {
            self.visible.offset(l.left - self.visible.left, 0.0);
        } else if self.visible.right > l.right {
            self.visible.offset(l.right - self.visible.right, 0.0);
        }
        if self.visible.bottom < l.bottom {
            self.visible.offset(0.0, l.bottom - self.visible.bottom);
        } else if self.visible.top > l.top {
            self.visible.offset(0.0, l.top - self.visible.top);
        }
        self.orig_visible = self.visible;
    }

    // ── rules ─────────────────────────────────────────────────────────────

    fn apply_rules(&mut self, center: DVec2) {
        self.correct_scale(center);
        self.scale_to_fit_limits();
        self.shift_to_fit_limits();
        self.adjust_visible_rect();
    }

    /// Lowest priority rule; later rules may undo it.
    fn correct_scale(&mut self, center: DVec2) {
        let scale = self.scale();
        if self.min_scale.x != 0.0 && scale.x < self.min_scale.x {
            let w = f64::from(self.viewport.width) * self.min_scale.x;
            let left = center.x - w / 2.0;
            self.orig_visible.set_x(left, left + w);
        }
        if self.min_scale.y != 0.0 && scale.y < self.min_scale.y {
            let h = f64::from(self.viewport.height) * self.min_scale.y;
            let bottom = center.y - h / 2.0;
            self.orig_visible.set_y(bottom, bottom + h);
        }
    }

    fn scale_to_fit_limits(&mut self) {
        if self.adjust_x.scale_to_limits
            && self.orig_visible.width().abs() > self.limits.width().abs()
        {
            self.orig_visible.set_x(self.limits.left, self.limits.right);
        }
        if self.adjust_y.scale_to_limits
            && self.orig_visible.height().abs() > self.limits.height().abs()
        {
            self.orig_visible.set_y(self.limits.bottom, self.limits.top);
        }
    }

    fn shift_to_fit_limits(&mut self) {
        if self.adjust_x.shift_to_limits {
            let shift = limit_shift(
                self.limits.left - self.orig_visible.left,
                self.limits.right - self.orig_visible.right,
                self.limits.right < self.limits.left,
                self.anchor_x,
            );
            self.orig_visible.offset(shift, 0.0);
        }
        if self.adjust_y.shift_to_limits {
            let shift = limit_shift(
                self.limits.bottom - self.orig_visible.bottom,
                self.limits.top - self.orig_visible.top,
                self.limits.top < self.limits.bottom,
                self.anchor_y,
            );
            self.orig_visible.offset(0.0, shift);
        }
        self.visible = self.orig_visible;
    }

    /// Applies proportional mode to `visible` only, growing from the anchor.
    fn adjust_visible_rect(&mut self) {
        if !self.proportional {
            return;
        }
        let scale = self.scale();
        let uniform = scale.x.max(scale.y);

        if uniform != scale.x {
            let w = f64::from(self.viewport.width) * uniform;
            let o = self.orig_visible;
            let (left, right) = anchored(o.left, o.right, w, self.anchor_x);
            self.visible.set_x(left, right);
        }
        if uniform != scale.y {
            let h = f64::from(self.viewport.height) * uniform;
            let o = self.orig_visible;
            let (bottom, top) = anchored(o.bottom, o.top, h, self.anchor_y);
            self.visible.set_y(bottom, top);
        }
    }
}

/// New `(low, high)` edges of extent `size`, fixed at the anchored edge.
fn anchored(low: f64, high: f64, size: f64, anchor: Anchor) -> (f64, f64) {
    match anchor {
        Anchor::Start => (low, low + size),
        Anchor::End => (high - size, high),
        Anchor::Center => {
            let low = (low + high - size) / 2.0;
            (low, low + size)
        }
    }
}

/// Offset that moves a visible range back inside the limits. `low` and
/// `high` are the distances from the visible edges to the limit edges.
fn limit_shift(low: f64, high: f64, reversed: bool, anchor: Anchor) -> f64 {
    match (anchor, reversed) {
        (Anchor::Center, _) => (low + high) / 2.0,
        (Anchor::Start, false) if low > 0.0 => low,
        (Anchor::Start, false) if high < 0.0 => high.max(low),
        (Anchor::Start, true) if low < 0.0 => low,
        (Anchor::Start, true) if high > 0.0 => high.min(low),
        (Anchor::End, false) if high < 0.0 => high,
        (Anchor::End, false) if low > 0.0 => high.max(low),
        (Anchor::End, true) if high > 0.0 => high,
        (Anchor::End, true) if low < 0.0 => high.max(low),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{NullBackend, PixelFormat};
    use crate::config::RenderConfig;
    use crate::pipeline::PipelineStateCache;

    fn renderer() -> ImmediateRenderer {
        let backend = Arc::new(NullBackend::default());
        let cache = Arc::new(PipelineStateCache::new(backend.clone()));
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        let mut r = ImmediateRenderer::new(backend, cache, &RenderConfig::default());
        r.set_client_size(800, 600);
        r
    }

    fn pane() -> Pane {
        let mut p = Pane::new();
        p.set_limits(ModelRect::new(0.0, 0.0, 1000.0, 500.0));
        p.set_visible_rect(ModelRect::new(0.0, 0.0, 1000.0, 500.0));
        p.set_viewport(ViewportRect::new(100, 50, 400, 200));
        p
    }

    fn close(a: DVec2, b: DVec2) -> bool {
        (a - b).length() < 1e-9
    }

    // ── open / project ────────────────────────────────────────────────────

    #[test]
    fn ortho_project_round_trips() {
        let mut r = renderer();
        let mut p = pane();
        assert!(p.open(&mut r, ProjectionMode::Ortho));

        // Model corners land on the viewport corners.
        assert!(close(p.project(0.0, 0.0), DVec2::new(100.0, 50.0)));
        assert!(close(p.project(1000.0, 500.0), DVec2::new(500.0, 250.0)));

        let m = DVec2::new(321.5, 77.25);
        assert!(close(p.unproject(p.project(m.x, m.y).x, p.project(m.x, m.y).y), m));
        assert!((p.unproject_width(4.0) - 10.0).abs() < 1e-9);
        assert!((p.unproject_height(4.0) - 10.0).abs() < 1e-9);
        p.close(&mut r);
        assert_eq!(p.mode(), None);
    }

    #[test]
    fn offset_mode_projects_relative_to_visible_origin() {
        let mut r = renderer();
        let mut p = pane();
        p.zoom_rect(ModelRect::new(200.0, 100.0, 600.0, 300.0));
        p.enable_offset(true);
        assert!(p.open(&mut r, ProjectionMode::Ortho));

        assert!(close(p.project(200.0, 100.0), DVec2::new(100.0, 50.0)));
        assert!(close(p.unproject(500.0, 250.0), DVec2::new(600.0, 300.0)));
        assert!((p.project_x(400.0) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_mode_has_half_pixel_border() {
        let mut r = renderer();
        let mut p = pane();
        assert!(p.open(&mut r, ProjectionMode::Pixels));
        let inner = p.project(100.0, 50.0);
        assert!(inner.x > 100.0 && inner.x < 101.0);

        p.close(&mut r);
        p.set_exact_ortho(true);
        assert!(p.open(&mut r, ProjectionMode::Pixels));
        assert!(close(p.project(100.0, 50.0), DVec2::new(100.0, 50.0)));
    }

    #[test]
    fn open_sets_viewport_and_clipped_scissor() {
        let mut r = renderer();
        let mut p = pane();
        p.set_clip_rect(Some(ViewportRect::new(0, 0, 200, 600)));
        assert!(p.open(&mut r, ProjectionMode::Ortho));

        assert_eq!(r.viewport_rect(), [100.0, 50.0, 400.0, 200.0]);
        assert!(r.is_enabled(Capability::ScissorTest));
        let s = r.state().scissor;
        assert_eq!((s.x, s.width, s.height), (100, 100, 200));

        p.close(&mut r);
        assert!(!r.is_enabled(Capability::ScissorTest));
    }

    #[test]
    fn open_twice_or_empty_fails() {
        let mut r = renderer();
        let mut p = pane();
        assert!(p.open(&mut r, ProjectionMode::Ortho));
        assert!(!p.open(&mut r, ProjectionMode::Pixels));
        assert_eq!(p.mode(), Some(ProjectionMode::Ortho));

        let mut empty = Pane::new();
        assert!(!empty.open(&mut r, ProjectionMode::Ortho));
    }

    // ── zoom ──────────────────────────────────────────────────────────────

    #[test]
    fn zoom_in_and_out_around_center() {
        let mut p = pane();
        assert!(!p.is_zoom_out_available());
        p.zoom_in_center(ZoomAxes::BOTH);
        assert_eq!(p.visible_rect(), ModelRect::new(250.0, 125.0, 750.0, 375.0));
        assert!(p.is_zoom_out_available());

        p.zoom_out_center(ZoomAxes::BOTH);
        assert_eq!(p.visible_rect(), ModelRect::new(0.0, 0.0, 1000.0, 500.0));
    }

    #[test]
    fn zoom_near_edge_shifts_back_inside() {
        let mut p = pane();
        p.zoom_point(950.0, 480.0, 4.0, ZoomAxes::BOTH);
        let v = p.visible_rect();
        assert_eq!((v.width(), v.height()), (250.0, 125.0));
        assert_eq!((v.right, v.top), (1000.0, 500.0));
    }

    #[test]
    fn zoom_out_is_capped_by_limits() {
        let mut p = pane();
        p.zoom_point(500.0, 250.0, 0.25, ZoomAxes::BOTH);
        assert_eq!(p.visible_rect(), p.limits());
    }

    #[test]
    fn disabled_axis_is_left_alone() {
        let mut p = pane();
        p.enable_zoom(true, false);
        p.zoom_in_center(ZoomAxes::BOTH);
        let v = p.visible_rect();
        assert_eq!(v.width(), 500.0);
        assert_eq!(v.height(), 500.0);

        p.zoom_rect(ModelRect::new(0.0, 0.0, 100.0, 100.0));
        p.zoom_all(ZoomAxes {
            force: true,
            ..ZoomAxes::BOTH
        });
        assert_eq!(p.visible_rect(), p.limits());
    }

    #[test]
    fn min_scale_limits_zoom_in() {
        let mut p = pane();
        p.set_min_scale(0.5, 0.0);
        p.zoom_point(500.0, 250.0, 50.0, ZoomAxes::X);
        assert_eq!(p.visible_rect().width(), 200.0);
        assert_eq!(p.visible_rect().center().x, 500.0);
    }

    #[test]
    fn proportional_mode_uses_coarser_scale() {
        let mut p = pane();
        p.set_proportional(true);
        p.set_adjust(Adjust::NONE, Adjust::NONE);
        p.zoom_rect(ModelRect::new(0.0, 0.0, 400.0, 400.0));
        // 1 unit/px across, 2 units/px up: both become 2.
        assert_eq!(p.scale(), DVec2::new(2.0, 2.0));
        assert_eq!(p.visible_rect().left, 0.0);
        assert_eq!(p.visible_rect().right, 800.0);
    }

    #[test]
    fn set_scale_ref_point_keeps_reference_fixed() {
        let mut p = pane();
        p.set_adjust(Adjust::NONE, Adjust::NONE);
        p.set_scale_ref_point(1.25, 1.25, DVec2::new(250.0, 125.0));
        let v = p.visible_rect();
        // The reference sat a quarter of the way across before and after.
        assert!(((250.0 - v.left) / v.width() - 0.25).abs() < 1e-12);
        assert_eq!(p.scale(), DVec2::new(1.25, 1.25));
    }

    // ── scroll ────────────────────────────────────────────────────────────

    #[test]
    fn scroll_stops_at_limits() {
        let mut p = pane();
        p.zoom_rect(ModelRect::new(0.0, 0.0, 500.0, 250.0));
        assert!(p.needs_scroll_x() && p.needs_scroll_y());
        p.scroll(800.0, -50.0);
        assert_eq!(p.visible_rect(), ModelRect::new(500.0, 0.0, 1000.0, 250.0));
    }

    #[test]
    fn scroll_to_pushes_without_resizing() {
        let mut p = pane();
        p.zoom_rect(ModelRect::new(0.0, 0.0, 500.0, 250.0));
        p.scroll_to(DVec2::new(990.0, 10.0), 0.5, 0.5);
        assert_eq!(p.visible_rect(), ModelRect::new(500.0, 0.0, 1000.0, 250.0));
    }

    #[test]
    fn reversed_limits_shift_the_other_way() {
        assert_eq!(limit_shift(-5.0, 3.0, true, Anchor::Start), -5.0);
        assert_eq!(limit_shift(2.0, -4.0, false, Anchor::End), -4.0);
        assert_eq!(limit_shift(2.0, 4.0, false, Anchor::Center), 3.0);
    }
}
