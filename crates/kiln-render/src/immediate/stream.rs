//! Vertices and attributes recorded between `begin` and `end`.
//!
//! Attribute streams are sticky: a stream that has been touched at least once
//! is padded forward with its last value, so at `end` it is exactly as long
//! as the vertex stream. A stream never touched stays empty. An attribute
//! call made after the last vertex applies to the next vertex; repeating it
//! before that vertex replaces the pending value.

use crate::geometry::DrawMode;

#[derive(Debug, Clone)]
pub struct PendingStream {
    pub mode: DrawMode,
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub tex_coords: Vec<[f32; 2]>,
}

impl PendingStream {
    pub fn new(mode: DrawMode) -> Self {
        Self {
            mode,
            positions: Vec::new(),
            colors: Vec::new(),
            tex_coords: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// `prior` is the current color before this call; it fills vertices
    /// recorded before the first color.
    pub fn push_color(&mut self, color: [f32; 4], prior: [f32; 4]) {
        push_attribute(&mut self.colors, self.positions.len(), color, prior);
    }

    pub fn push_tex_coord(&mut self, uv: [f32; 2]) {
        push_attribute(&mut self.tex_coords, self.positions.len(), uv, [0.0, 0.0]);
    }

    /// With `expand_fan`, a fan vertex after the third is preceded by copies
    /// of the hub and the previous vertex, turning the fan into a triangle
    /// list as it is recorded.
    pub fn push_vertex(&mut self, position: [f32; 3], expand_fan: bool) {
        let n = self.positions.len();
        if expand_fan && self.mode == DrawMode::TriangleFan && n >= 3 {
            expand_attribute(&mut self.colors, n);
            expand_attribute(&mut self.tex_coords, n);
            let (hub, prev) = (self.positions[0], self.positions[n - 1]);
            self.positions.push(hub);
            self.positions.push(prev);
        }
        self.positions.push(position);
    }

    /// Appends a copy of vertex 0 and its attributes.
    pub fn close_loop(&mut self) {
        let n = self.positions.len();
        if n == 0 {
            return;
        }
        close_attribute(&mut self.colors, n);
        close_attribute(&mut self.tex_coords, n);
        self.positions.push(self.positions[0]);
    }

    /// Drops attributes left pending past the last vertex and pads the rest.
    pub fn finish(&mut self) {
        let n = self.positions.len();
        sync(&mut self.colors, n);
        sync(&mut self.tex_coords, n);
    }
}

fn push_attribute<T: Copy>(attr: &mut Vec<T>, vertices: usize, value: T, default: T) {
    if attr.len() > vertices {
        if let Some(pending) = attr.last_mut() {
            *pending = value;
        }
        return;
    }
    let fill = attr.last().copied().unwrap_or(default);
    attr.resize(vertices, fill);
    attr.push(value);
}

fn expand_attribute<T: Copy>(attr: &mut Vec<T>, vertices: usize) {
    if attr.is_empty() {
        return;
    }
    let pending = (attr.len() > vertices).then(|| attr.pop()).flatten();
    sync(attr, vertices);
    let (hub, prev) = (attr[0], attr[vertices - 1]);
    attr.push(hub);
    attr.push(prev);
    if let Some(pending) = pending {
        attr.push(pending);
    }
}

fn close_attribute<T: Copy>(attr: &mut Vec<T>, vertices: usize) {
    if attr.is_empty() {
        return;
    }
    sync(attr, vertices);
    attr.push(attr[0]);
}

/// Truncates or pads a touched stream to `vertices` entries.
fn sync<T: Copy>(attr: &mut Vec<T>, vertices: usize) {
    if let Some(&last) = attr.last() {
        attr.resize(vertices, last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [f32; 4] = [1.0; 4];
    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

    fn v(x: f32, y: f32) -> [f32; 3] {
        [x, y, 0.0]
    }

    // ── sticky attributes ─────────────────────────────────────────────────

    #[test]
    fn untouched_streams_stay_empty() {
        let mut s = PendingStream::new(DrawMode::Triangles);
        s.push_vertex(v(0.0, 0.0), true);
        s.push_vertex(v(1.0, 0.0), true);
        s.finish();
        assert!(s.colors.is_empty());
        assert!(s.tex_coords.is_empty());
    }

    #[test]
    fn color_prefix_uses_prior_and_pads_forward() {
        let mut s = PendingStream::new(DrawMode::Points);
        s.push_vertex(v(0.0, 0.0), true);
        s.push_color(RED, WHITE);
        s.push_vertex(v(1.0, 0.0), true);
        s.push_vertex(v(2.0, 0.0), true);
        s.finish();
        assert_eq!(s.colors, vec![WHITE, RED, RED]);
    }

    #[test]
    fn repeated_color_replaces_pending() {
        let mut s = PendingStream::new(DrawMode::Points);
        s.push_color(RED, WHITE);
        s.push_color(BLUE, RED);
        s.push_vertex(v(0.0, 0.0), true);
        s.finish();
        assert_eq!(s.colors, vec![BLUE]);
    }

    #[test]
    fn trailing_attribute_is_dropped() {
        let mut s = PendingStream::new(DrawMode::Points);
        s.push_tex_coord([0.5, 0.5]);
        s.push_vertex(v(0.0, 0.0), true);
        s.push_tex_coord([1.0, 1.0]);
        s.finish();
        assert_eq!(s.tex_coords, vec![[0.5, 0.5]]);
    }

    // ── fans and loops ────────────────────────────────────────────────────

    #[test]
    fn fan_expands_while_recording() {
        let mut s = PendingStream::new(DrawMode::TriangleFan);
        for i in 0..5 {
            s.push_vertex(v(i as f32, 0.0), true);
            if i == 3 {
                assert_eq!(s.vertex_count(), 6);
            }
        }
        assert_eq!(s.vertex_count(), 9);
        let xs: Vec<f32> = s.positions.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 0.0, 2.0, 3.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn fan_expansion_carries_attributes() {
        let mut s = PendingStream::new(DrawMode::TriangleFan);
        let colors = [RED, BLUE, WHITE, RED];
        for (i, c) in colors.into_iter().enumerate() {
            s.push_color(c, WHITE);
            s.push_vertex(v(i as f32, 0.0), true);
        }
        s.finish();
        assert_eq!(s.colors, vec![RED, BLUE, WHITE, RED, WHITE, RED]);
    }

    #[test]
    fn native_fan_is_left_alone() {
        let mut s = PendingStream::new(DrawMode::TriangleFan);
        for i in 0..5 {
            s.push_vertex(v(i as f32, 0.0), false);
        }
        assert_eq!(s.vertex_count(), 5);
    }

    #[test]
    fn loop_closes_with_first_vertex() {
        let mut s = PendingStream::new(DrawMode::LineLoop);
        s.push_color(RED, WHITE);
        s.push_vertex(v(0.0, 0.0), true);
        s.push_color(BLUE, RED);
        s.push_vertex(v(1.0, 0.0), true);
        s.push_vertex(v(1.0, 1.0), true);
        s.close_loop();
        s.finish();
        assert_eq!(s.positions.len(), 4);
        assert_eq!(s.positions[3], s.positions[0]);
        assert_eq!(s.colors, vec![RED, BLUE, BLUE, RED]);
    }
}
