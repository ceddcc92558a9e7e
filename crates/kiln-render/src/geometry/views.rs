//! Read-only views drawing a subset of another buffer.

use std::sync::{Arc, Weak};

use super::GeometryBuffer;
use crate::immediate::ImmediateRenderer;

/// Draws the parent's segments as 1-pixel native lines.
#[derive(Debug, Clone)]
pub struct NarrowEdge {
    parent: Weak<GeometryBuffer>,
}

impl NarrowEdge {
    pub(crate) fn new(parent: &Arc<GeometryBuffer>) -> Self {
        Self {
            parent: Arc::downgrade(parent),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.parent.strong_count() > 0
    }

    pub fn draw(&self, renderer: &ImmediateRenderer) {
        match self.parent.upgrade() {
            Some(parent) => renderer.draw_narrow_edges(&parent),
            None => log::debug!("narrow edge: parent geometry dropped"),
        }
    }
}

/// Draws every fourth vertex of the parent, starting at index 1, as points.
///
/// Edge meshes store each L-shaped connector as four vertices; index 1 of
/// each group is the corner that needs filling.
#[derive(Debug, Clone)]
pub struct FillerPoint {
    parent: Weak<GeometryBuffer>,
}

impl FillerPoint {
    pub(crate) fn new(parent: &Arc<GeometryBuffer>) -> Self {
        Self {
            parent: Arc::downgrade(parent),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.parent.strong_count() > 0
    }

    /// Parent vertex indices this view draws.
    pub fn indices(vertex_count: usize) -> Vec<u32> {
        (1..vertex_count as u32).step_by(4).collect()
    }

    pub fn draw(&self, renderer: &ImmediateRenderer) {
        match self.parent.upgrade() {
            Some(parent) => {
                renderer.draw_filler_points(&parent, &Self::indices(parent.vertex_count()))
            }
            None => log::debug!("filler point: parent geometry dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_indices_pick_corners() {
        assert_eq!(FillerPoint::indices(0), Vec::<u32>::new());
        assert_eq!(FillerPoint::indices(1), Vec::<u32>::new());
        assert_eq!(FillerPoint::indices(8), vec![1, 5]);
        assert_eq!(FillerPoint::indices(10), vec![1, 5, 9]);
    }
}
