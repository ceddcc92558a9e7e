//! Process-wide resource management and GPU-backed resources.

mod framebuffer;
mod manager;
mod texture;

pub use framebuffer::FrameBuffer;
pub use manager::{GraphicsContext, ResourceManager};
pub use texture::Texture;
