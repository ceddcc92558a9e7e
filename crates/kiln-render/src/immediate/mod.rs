//! Begin/Vertex/End emulation over a [`crate::Backend`].

mod emit;
mod renderer;
mod state;
mod stream;

pub use emit::PolygonVertex;
pub use renderer::ImmediateRenderer;
pub use state::{
    BlendFactor, BoundTexture, Capability, HintMode, HintTarget, PolygonMode, RenderState,
    ShadeModel, TexEnvMode, TexEnvName, TexEnvTarget,
};
pub use stream::PendingStream;
