//! Kiln render crate.
//!
//! An immediate-mode drawing interface (Begin/Vertex/End, matrix stacks,
//! fixed render state) layered over interchangeable GPU backends. Callers talk
//! to one [`ImmediateRenderer`]; the renderer batches vertices, resolves
//! pipeline states and emits backend draw calls.

pub mod backend;
pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod immediate;
pub mod lines;
pub mod logging;
pub mod math;
pub mod pane;
pub mod pipeline;
pub mod resources;

pub use backend::{Api, Backend, BackendCaps};
pub use config::RenderConfig;
pub use error::{RenderError, Result};
pub use immediate::ImmediateRenderer;
pub use pane::Pane;
pub use resources::{FrameBuffer, GraphicsContext, ResourceManager, Texture};
