//! Vertex storage and the primitive shapes built on it.

mod buffer;
pub(crate) mod chunk;
mod tree_node;
mod views;

pub use buffer::GeometryBuffer;
pub use chunk::ChunkPlan;
pub use tree_node::{NodeInstance, TreeNodeGeometry};
pub use views::{FillerPoint, NarrowEdge};

use crate::pipeline::PipelineCategory;

/// Primitive assembly requested by `begin` or stored in a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
}

impl DrawMode {
    pub fn is_filled(self) -> bool {
        matches!(
            self,
            DrawMode::Triangles | DrawMode::TriangleStrip | DrawMode::TriangleFan | DrawMode::Quads
        )
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    #[default]
    None,
    D2,
    D3,
}

impl VertexFormat {
    pub fn stride(self) -> usize {
        match self {
            VertexFormat::None => 0,
            VertexFormat::D2 => 8,
            VertexFormat::D3 => 12,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum SecondaryFormat {
    #[default]
    None,
    ColorFloat,
    ColorByte,
    Tex1D,
    Tex2D,
}

impl SecondaryFormat {
    pub fn stride(self) -> usize {
        match self {
            SecondaryFormat::None => 0,
            SecondaryFormat::ColorFloat => 16,
            SecondaryFormat::ColorByte => 4,
            SecondaryFormat::Tex1D => 4,
            SecondaryFormat::Tex2D => 8,
        }
    }

    pub fn is_color(self) -> bool {
        matches!(self, SecondaryFormat::ColorFloat | SecondaryFormat::ColorByte)
    }
}

/// Pipeline category able to draw a vertex/secondary combination.
///
/// `secondary` is what the buffer carries right now, so a buffer whose
/// secondary stream is empty always resolves to a plain category.
pub fn category_for(vertex: VertexFormat, secondary: SecondaryFormat) -> Option<PipelineCategory> {
    use PipelineCategory as C;
    use SecondaryFormat as S;

    match (vertex, secondary) {
        (VertexFormat::D3, S::None) => Some(C::Plain),
        (VertexFormat::D3, S::ColorFloat) => Some(C::Color),
        (VertexFormat::D3, S::Tex2D) => Some(C::Texture),
        (VertexFormat::D2, S::None) => Some(C::Plain2D),
        (VertexFormat::D2, S::ColorFloat) => Some(C::Color2D),
        (VertexFormat::D2, S::ColorByte) => Some(C::Color2DByte),
        (VertexFormat::D2, S::Tex1D) => Some(C::Texture1D),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_buffer_formats() {
        assert_eq!(
            category_for(VertexFormat::D3, SecondaryFormat::None),
            Some(PipelineCategory::Plain)
        );
        assert_eq!(
            category_for(VertexFormat::D2, SecondaryFormat::ColorByte),
            Some(PipelineCategory::Color2DByte)
        );
        assert_eq!(
            category_for(VertexFormat::D2, SecondaryFormat::Tex1D),
            Some(PipelineCategory::Texture1D)
        );
    }

    #[test]
    fn unsupported_combinations_have_no_category() {
        assert_eq!(category_for(VertexFormat::None, SecondaryFormat::None), None);
        assert_eq!(category_for(VertexFormat::D3, SecondaryFormat::ColorByte), None);
        assert_eq!(category_for(VertexFormat::D2, SecondaryFormat::Tex2D), None);
    }

    #[test]
    fn category_strides_match_formats() {
        let cases = [
            (VertexFormat::D3, SecondaryFormat::ColorFloat),
            (VertexFormat::D2, SecondaryFormat::ColorByte),
            (VertexFormat::D2, SecondaryFormat::Tex1D),
            (VertexFormat::D3, SecondaryFormat::Tex2D),
        ];
        for (v, s) in cases {
            let streams = category_for(v, s).unwrap().layout().streams();
            assert_eq!(streams[0].stride as usize, v.stride());
            assert_eq!(streams[1].stride as usize, s.stride());
        }
    }
}
