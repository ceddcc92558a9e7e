//! Splits a vertex range into draws that fit the backend transfer budget.
//!
//! One plan serves every chunked path: generic draws, extruded lines,
//! instanced tree nodes and filler points. Chunks end on primitive
//! boundaries and strips re-include their trailing vertices so the
//! primitive stays connected across draws.

use std::ops::Range;

use crate::backend::Topology;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChunkPlan {
    /// Vertices per chunk, a multiple of the primitive group. `None` draws
    /// everything at once.
    block: Option<usize>,
    /// Vertices the next chunk repeats from the end of the previous one.
    overlap: usize,
}

impl ChunkPlan {
    pub fn new(topology: Topology, element_size: usize, budget: Option<usize>) -> Self {
        let (group, overlap) = match topology {
            Topology::PointList => (1, 0),
            Topology::LineList => (2, 0),
            Topology::LineStrip => (1, 1),
            Topology::TriangleList => (3, 0),
            // Even block size keeps the winding of restarted strips.
            Topology::TriangleStrip => (4, 2),
            // Fans and quads only reach backends without a budget; a fan
            // cannot be restarted without its hub.
            Topology::TriangleFan | Topology::Quads => {
                return Self {
                    block: None,
                    overlap: 0,
                };
            }
        };

        let block = budget.map(|budget| {
            let groups = (budget / (group * element_size.max(1))).max(1);
            let block = groups * group;
            if block > overlap {
                block
            } else {
                (overlap / group + 1) * group
            }
        });
        Self { block, overlap }
    }

    pub fn block(&self) -> Option<usize> {
        self.block
    }

    pub fn ranges(&self, count: usize) -> Vec<Range<usize>> {
        let Some(block) = self.block else {
            return if count == 0 { Vec::new() } else { vec![0..count] };
        };

        let mut out = Vec::new();
        let mut start = 0;
        while start < count {
            let end = (start + block).min(count);
            out.push(start..end);
            if end == count {
                break;
            }
            start = end - self.overlap;
        }
        out
    }
}
