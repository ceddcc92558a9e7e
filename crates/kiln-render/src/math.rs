//! Matrix stacks and the fixed transforms of the immediate-mode API.
//!
//! All matrices are column-major `f64`, matching the `LoadMatrix`/`MultMatrix`
//! array convention. They are narrowed to `f32` only when uniforms are built.

use glam::{DMat4, DQuat, DVec3};

/// Which stack the matrix calls act on.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum MatrixMode {
    #[default]
    ModelView,
    Projection,
}

/// Non-empty stack of transforms; the top is the current matrix.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    stack: Vec<DMat4>,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self {
            stack: vec![DMat4::IDENTITY],
        }
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn top(&self) -> DMat4 {
        // Invariant: never empty.
        self.stack.last().copied().unwrap_or(DMat4::IDENTITY)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Duplicates the current matrix.
    pub fn push(&mut self) {
        let top = self.top();
        self.stack.push(top);
    }

    /// Discards the current matrix. A single remaining matrix is kept.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn load(&mut self, m: DMat4) {
        if let Some(top) = self.stack.last_mut() {
            *top = m;
        }
    }

    pub fn load_identity(&mut self) {
        self.load(DMat4::IDENTITY);
    }

    /// Right-multiplies the current matrix: `top = top * m`.
    pub fn mult(&mut self, m: DMat4) {
        if let Some(top) = self.stack.last_mut() {
            *top = *top * m;
        }
    }
}

/// Rotation of `angle_deg` degrees about `(x, y, z)`.
///
/// Built from a unit quaternion; returns `None` for a zero-length axis.
pub fn rotation(angle_deg: f64, x: f64, y: f64, z: f64) -> Option<DMat4> {
    let axis = DVec3::new(x, y, z);
    let len = axis.length();
    if len == 0.0 || !len.is_finite() {
        return None;
    }
    let n = axis / len;
    let half = angle_deg * std::f64::consts::PI / 360.0;
    let (s, c) = half.sin_cos();
    let q = DQuat::from_xyzw(s * n.x, s * n.y, s * n.z, c);
    Some(DMat4::from_quat(q))
}

/// Orthographic projection with GL clip conventions (z in -1..1).
pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> DMat4 {
    DMat4::orthographic_rh_gl(left, right, bottom, top, near, far)
}

/// Maps normalized device coordinates to window pixels for a viewport.
pub fn window_matrix(x: f64, y: f64, w: f64, h: f64) -> DMat4 {
    DMat4::from_cols_array(&[
        w / 2.0,
        0.0,
        0.0,
        0.0,
        0.0,
        h / 2.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
        w / 2.0 + x,
        h / 2.0 + y,
        0.0,
        1.0,
    ])
}

/// Inverse of [`window_matrix`]: window pixels back to device coordinates.
pub fn window_projection(x: f64, y: f64, w: f64, h: f64) -> DMat4 {
    let w = if w == 0.0 { 1.0 } else { w };
    let h = if h == 0.0 { 1.0 } else { h };
    DMat4::from_cols_array(&[
        2.0 / w,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 / h,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
        -2.0 * x / w - 1.0,
        -2.0 * y / h - 1.0,
        0.0,
        1.0,
    ])
}

#[inline]
pub fn to_f32_cols(m: DMat4) -> [[f32; 4]; 4] {
    m.as_mat4().to_cols_array_2d()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: DMat4, b: DMat4) -> bool {
        a.abs_diff_eq(b, 1e-9)
    }

    // ── stack ─────────────────────────────────────────────────────────────

    #[test]
    fn pop_on_fresh_stack_keeps_identity() {
        let mut s = MatrixStack::new();
        s.pop();
        s.pop();
        assert_eq!(s.depth(), 1);
        assert_eq!(s.top(), DMat4::IDENTITY);
    }

    #[test]
    fn push_duplicates_top() {
        let mut s = MatrixStack::new();
        s.load(DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0)));
        s.push();
        assert_eq!(s.depth(), 2);
        s.load_identity();
        s.pop();
        assert_eq!(s.top(), DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn mult_is_right_multiplication() {
        let mut s = MatrixStack::new();
        let t = DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0));
        let sc = DMat4::from_scale(DVec3::splat(2.0));
        s.load(t);
        s.mult(sc);
        // Scale applies first, then translation.
        let p = s.top().transform_point3(DVec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 7.0).abs() < 1e-12);
    }

    // ── rotation ──────────────────────────────────────────────────────────

    #[test]
    fn rotation_zero_axis_is_none() {
        assert!(rotation(45.0, 0.0, 0.0, 0.0).is_none());
    }

    #[test]
    fn rotation_normalizes_axis() {
        let a = rotation(90.0, 0.0, 0.0, 10.0).unwrap();
        let b = rotation(90.0, 0.0, 0.0, 1.0).unwrap();
        assert!(approx(a, b));
        let p = a.transform_point3(DVec3::X);
        assert!((p - DVec3::Y).length() < 1e-12);
    }

    // ── window matrices ───────────────────────────────────────────────────

    #[test]
    fn window_projection_inverts_window_matrix() {
        let w = window_matrix(10.0, 20.0, 640.0, 480.0);
        let p = window_projection(10.0, 20.0, 640.0, 480.0);
        assert!(approx(w * p, DMat4::IDENTITY));
    }

    #[test]
    fn window_matrix_maps_ndc_corners() {
        let w = window_matrix(0.0, 0.0, 100.0, 50.0);
        let p = w.transform_point3(DVec3::new(1.0, 1.0, 0.0));
        assert_eq!((p.x, p.y), (100.0, 50.0));
    }

    #[test]
    fn ortho_maps_box_to_clip_cube() {
        let m = ortho(0.0, 200.0, 0.0, 100.0, -1.0, 1.0);
        let p = m.transform_point3(DVec3::new(200.0, 100.0, 0.0));
        assert!((p.x - 1.0).abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12);
    }
}
