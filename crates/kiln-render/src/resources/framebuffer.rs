use std::sync::Arc;

use crate::backend::{
    Backend, PixelFormat, SamplerParams, TargetBinding, TextureDesc, TextureHandle, mip_level_count,
};
use crate::error::Result;
use crate::immediate::{BoundTexture, Capability, ImmediateRenderer};

/// A square render target that can be sampled afterwards.
///
/// Command-buffer targets store row 0 at the top. After every
/// [`render`](Self::render) the rows are swapped top to bottom so the result
/// samples with the same orientation as an image uploaded by [`crate::Texture`].
pub struct FrameBuffer {
    backend: Arc<dyn Backend>,
    dim: u32,
    handle: TextureHandle,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub(crate) fn new(backend: Arc<dyn Backend>, dim: u32, format: PixelFormat) -> Result<Self> {
        let handle = backend.create_texture(&TextureDesc {
            label: format!("framebuffer {dim}x{dim}"),
            width: dim,
            height: dim,
            format,
            mip_levels: mip_level_count(dim, dim),
            render_target: true,
            sampler: SamplerParams::default(),
        })?;
        Ok(Self {
            backend,
            dim,
            handle,
            pixels: Vec::new(),
        })
    }

    pub fn dim(&self) -> u32 {
        self.dim
    }

    pub fn texture_handle(&self) -> TextureHandle {
        self.handle
    }

    /// For [`ImmediateRenderer::bind_texture`].
    pub fn bound_texture(&self) -> BoundTexture {
        BoundTexture {
            handle: self.handle,
            alpha_only: false,
        }
    }

    /// RGBA rows of the last render, after the flip.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Runs `draw` with this framebuffer as the target, then reads the result
    /// back, flips it and writes it back.
    ///
    /// The previous target, viewport, client size and scissor are restored
    /// even when readback fails. The scissor test starts disabled.
    pub fn render(
        &mut self,
        renderer: &mut ImmediateRenderer,
        draw: impl FnOnce(&mut ImmediateRenderer),
    ) -> Result<()> {
        let previous = self.backend.bind_target(TargetBinding::Texture(self.handle));
        let saved_viewport = renderer.viewport_rect();
        let saved_client = renderer.client_size();
        let saved_scissor = renderer.scissor_state();

        renderer.set_client_size(self.dim, self.dim);
        renderer.viewport(0, 0, self.dim as i32, self.dim as i32);
        renderer.disable(Capability::ScissorTest);
        draw(renderer);

        let flushed = self.backend.flush();
        self.backend.bind_target(previous);
        renderer.set_client_size(saved_client.0, saved_client.1);
        renderer.set_viewport_rect(saved_viewport);
        renderer.restore_scissor(saved_scissor);
        flushed?;

        let mut pixels = self.backend.read_texture(self.handle)?;
        flip_rows(&mut pixels, self.dim as usize * 4);
        self.backend.write_texture(self.handle, &pixels)?;
        log::trace!("framebuffer {}x{} read back", self.dim, self.dim);

        self.pixels = pixels;
        Ok(())
    }

    /// Rebuilds the mip chain from the current contents. Blocks until done.
    pub fn generate_mipmaps(&self) -> Result<()> {
        self.backend.generate_mipmaps(self.handle)
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.backend.release_texture(self.handle);
    }
}

fn flip_rows(pixels: &mut [u8], row_len: usize) {
    if row_len == 0 {
        return;
    }
    let rows = pixels.len() / row_len;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (upper, lower) = pixels.split_at_mut(bottom * row_len);
        upper[top * row_len..(top + 1) * row_len].swap_with_slice(&mut lower[..row_len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::geometry::DrawMode;
    use crate::math::MatrixMode;
    use crate::pipeline::PipelineStateCache;
    use crate::RenderConfig;

    fn setup() -> (Arc<NullBackend>, ImmediateRenderer) {
        let backend = Arc::new(NullBackend::default());
        let cache = Arc::new(PipelineStateCache::new(backend.clone()));
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        let mut renderer = ImmediateRenderer::new(backend.clone(), cache, &RenderConfig::default());
        renderer.set_client_size(640, 480);
        (backend, renderer)
    }

    #[test]
    fn flip_swaps_rows() {
        let mut p = vec![1, 1, 2, 2, 3, 3];
        flip_rows(&mut p, 2);
        assert_eq!(p, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn row_zero_is_the_unflipped_last_row() {
        let (backend, mut renderer) = setup();
        let mut fb = FrameBuffer::new(backend.clone(), 4, PixelFormat::Rgba8Unorm).unwrap();

        fb.render(&mut renderer, |r| {
            r.clear_color(0.0, 0.0, 0.0, 0.0);
            r.clear(true, false);
            r.matrix_mode(MatrixMode::Projection);
            r.load_identity();
            r.ortho(0.0, 4.0, 0.0, 4.0, -1.0, 1.0);
            r.matrix_mode(MatrixMode::ModelView);
            r.load_identity();
            // Top-left texel of the target.
            r.begin(DrawMode::Points);
            r.color3ub(255, 0, 0);
            r.vertex2f(0.5, 3.5);
            r.end();
        })
        .unwrap();

        let pixels = fb.pixels();
        let row = 4 * 4;
        assert!(pixels[..row].iter().all(|&b| b == 0));
        assert_eq!(&pixels[3 * row..3 * row + 4], &[255, 0, 0, 255]);
        assert_eq!(backend.read_texture(fb.texture_handle()).unwrap(), pixels);
    }

    #[test]
    fn render_restores_target_and_client_size() {
        let (backend, mut renderer) = setup();
        let mut fb = FrameBuffer::new(backend.clone(), 8, PixelFormat::Rgba8Unorm).unwrap();
        fb.render(&mut renderer, |r| {
            assert_eq!(r.client_size(), (8, 8));
        })
        .unwrap();

        assert_eq!(backend.target(), TargetBinding::Screen);
        assert_eq!(renderer.client_size(), (640, 480));
        assert_eq!(renderer.viewport_rect(), [0.0, 0.0, 640.0, 480.0]);
        assert!(backend.flush_count() >= 1);
    }

    #[test]
    fn render_restores_caller_scissor() {
        let (backend, mut renderer) = setup();
        renderer.enable(Capability::ScissorTest);
        renderer.scissor(10, 10, 100, 50);
        let outer = renderer.state().scissor;

        let mut fb = FrameBuffer::new(backend.clone(), 8, PixelFormat::Rgba8Unorm).unwrap();
        fb.render(&mut renderer, |r| {
            assert!(!r.is_enabled(Capability::ScissorTest));
            r.enable(Capability::ScissorTest);
            r.scissor(0, 0, 2, 2);
        })
        .unwrap();

        assert!(renderer.is_enabled(Capability::ScissorTest));
        assert_eq!(renderer.state().scissor, outer);
        assert_eq!(backend.scissor(), Some(outer));
    }

    #[test]
    fn render_leaves_disabled_scissor_off() {
        let (backend, mut renderer) = setup();
        let mut fb = FrameBuffer::new(backend.clone(), 8, PixelFormat::Rgba8Unorm).unwrap();
        fb.render(&mut renderer, |r| {
            r.enable(Capability::ScissorTest);
            r.scissor(0, 0, 2, 2);
        })
        .unwrap();

        assert!(!renderer.is_enabled(Capability::ScissorTest));
        assert_eq!(backend.scissor(), None);
    }

    #[test]
    fn drop_releases_target() {
        let (backend, _renderer) = setup();
        let fb = FrameBuffer::new(backend.clone(), 16, PixelFormat::Rgba8Unorm).unwrap();
        fb.generate_mipmaps().unwrap();
        assert_eq!(backend.live_textures(), 1);
        drop(fb);
        assert_eq!(backend.live_textures(), 0);
    }
}
