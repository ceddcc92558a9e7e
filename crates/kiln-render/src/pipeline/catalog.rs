//! The fixed set of programs every backend compiles.

use crate::backend::{BlendMode, VertexLayout};

/// Generic pipeline categories, looked up by index at draw time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PipelineCategory {
    Plain = 0,
    Color = 1,
    Texture = 2,
    TextureAlpha = 3,
    Plain2D = 4,
    Color2D = 5,
    Color2DByte = 6,
    Texture1D = 7,
}

impl PipelineCategory {
    pub const ALL: [PipelineCategory; 8] = [
        PipelineCategory::Plain,
        PipelineCategory::Color,
        PipelineCategory::Texture,
        PipelineCategory::TextureAlpha,
        PipelineCategory::Plain2D,
        PipelineCategory::Color2D,
        PipelineCategory::Color2DByte,
        PipelineCategory::Texture1D,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn vertex_fn(self) -> &'static str {
        match self {
            PipelineCategory::Plain => "vs_plain",
            PipelineCategory::Color => "vs_color",
            PipelineCategory::Texture | PipelineCategory::TextureAlpha => "vs_texture",
            PipelineCategory::Plain2D => "vs_plain_2d",
            PipelineCategory::Color2D | PipelineCategory::Color2DByte => "vs_color_2d",
            PipelineCategory::Texture1D => "vs_texture_1d",
        }
    }

    pub fn fragment_fn(self) -> &'static str {
        match self {
            PipelineCategory::Texture | PipelineCategory::Texture1D => "fs_texture",
            PipelineCategory::TextureAlpha => "fs_texture_alpha",
            _ => "fs_color",
        }
    }

    pub fn layout(self) -> VertexLayout {
        match self {
            PipelineCategory::Plain => VertexLayout::Plain3D,
            PipelineCategory::Color => VertexLayout::Color3D,
            PipelineCategory::Texture | PipelineCategory::TextureAlpha => VertexLayout::Texture3D,
            PipelineCategory::Plain2D => VertexLayout::Plain2D,
            PipelineCategory::Color2D => VertexLayout::Color2D,
            PipelineCategory::Color2DByte => VertexLayout::Color2DByte,
            PipelineCategory::Texture1D => VertexLayout::Texture1D,
        }
    }

    pub fn is_textured(self) -> bool {
        matches!(
            self,
            PipelineCategory::Texture | PipelineCategory::TextureAlpha | PipelineCategory::Texture1D
        )
    }
}

/// Single-purpose pipelines with a fixed blend configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NamedPipeline {
    Line = 0,
    LineSmooth = 1,
    LineStipple = 2,
    TreeNode = 3,
    StippledPolygon = 4,
}

impl NamedPipeline {
    pub const ALL: [NamedPipeline; 5] = [
        NamedPipeline::Line,
        NamedPipeline::LineSmooth,
        NamedPipeline::LineStipple,
        NamedPipeline::TreeNode,
        NamedPipeline::StippledPolygon,
    ];

    pub fn label(self) -> &'static str {
        match self {
            NamedPipeline::Line => "line",
            NamedPipeline::LineSmooth => "line smooth",
            NamedPipeline::LineStipple => "line stipple",
            NamedPipeline::TreeNode => "tree node",
            NamedPipeline::StippledPolygon => "stippled polygon",
        }
    }

    pub fn vertex_fn(self) -> &'static str {
        match self {
            NamedPipeline::Line | NamedPipeline::LineSmooth | NamedPipeline::LineStipple => {
                "vs_line"
            }
            NamedPipeline::TreeNode => "vs_tree_node",
            NamedPipeline::StippledPolygon => "vs_polygon",
        }
    }

    pub fn fragment_fn(self) -> &'static str {
        match self {
            NamedPipeline::Line | NamedPipeline::TreeNode => "fs_color",
            NamedPipeline::LineSmooth => "fs_line_smooth",
            NamedPipeline::LineStipple => "fs_line_stipple",
            NamedPipeline::StippledPolygon => "fs_polygon_stipple",
        }
    }

    pub fn layout(self) -> VertexLayout {
        match self {
            NamedPipeline::Line | NamedPipeline::LineSmooth | NamedPipeline::LineStipple => {
                VertexLayout::Line
            }
            NamedPipeline::TreeNode => VertexLayout::TreeNode,
            NamedPipeline::StippledPolygon => VertexLayout::Polygon,
        }
    }

    pub fn blend(self) -> BlendMode {
        match self {
            NamedPipeline::TreeNode => BlendMode::Opaque,
            NamedPipeline::Line
            | NamedPipeline::LineSmooth
            | NamedPipeline::LineStipple
            | NamedPipeline::StippledPolygon => BlendMode::Alpha,
        }
    }
}

/// Blend families compiled for every category, in lookup order.
pub const BLEND_FAMILIES: [BlendMode; 3] = [
    BlendMode::Opaque,
    BlendMode::Alpha,
    BlendMode::InverseDestination,
];

/// Every shader entry point the catalog refers to.
pub fn all_functions() -> impl Iterator<Item = &'static str> {
    let categories = PipelineCategory::ALL
        .into_iter()
        .flat_map(|c| [c.vertex_fn(), c.fragment_fn()]);
    let named = NamedPipeline::ALL
        .into_iter()
        .flat_map(|n| [n.vertex_fn(), n.fragment_fn()]);
    categories.chain(named)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips() {
        for c in PipelineCategory::ALL {
            assert_eq!(PipelineCategory::from_index(c.index()), Some(c));
        }
        assert_eq!(PipelineCategory::from_index(8), None);
    }

    #[test]
    fn texture_alpha_differs_only_in_fragment() {
        let t = PipelineCategory::Texture;
        let a = PipelineCategory::TextureAlpha;
        assert_eq!(t.vertex_fn(), a.vertex_fn());
        assert_eq!(t.layout(), a.layout());
        assert_ne!(t.fragment_fn(), a.fragment_fn());
    }

    #[test]
    fn line_pipelines_share_layout() {
        assert_eq!(NamedPipeline::Line.layout(), NamedPipeline::LineStipple.layout());
        assert_eq!(NamedPipeline::TreeNode.blend(), BlendMode::Opaque);
    }

    #[test]
    fn every_line_pipeline_blends() {
        for line in [NamedPipeline::Line, NamedPipeline::LineSmooth, NamedPipeline::LineStipple] {
            assert_eq!(line.blend(), BlendMode::Alpha);
        }
    }
}
