use std::io::{BufRead, Seek};
use std::sync::Arc;

use image::DynamicImage;

use crate::backend::{
    Backend, PixelFormat, SamplerParams, TextureDesc, TextureHandle, mip_level_count,
};
use crate::error::{RenderError, Result};
use crate::immediate::{BoundTexture, ImmediateRenderer};

#[derive(Debug, Clone)]
enum Source {
    Image(DynamicImage),
    /// Pre-converted texels, rows top first.
    Raw {
        width: u32,
        height: u32,
        format: PixelFormat,
        texels: Vec<u8>,
    },
}

/// A sampled texture with a CPU copy of its pixels.
///
/// The GPU copy is created by [`load`](Self::load) and dropped by
/// [`unload`](Self::unload); the CPU copy stays so the texture can be made
/// resident again at any time.
pub struct Texture {
    backend: Arc<dyn Backend>,
    label: String,
    source: Source,
    sampler: SamplerParams,
    mipmaps: bool,
    handle: Option<TextureHandle>,
}

impl Texture {
    pub(crate) fn from_image(
        backend: Arc<dyn Backend>,
        label: impl Into<String>,
        image: DynamicImage,
    ) -> Self {
        Self::with_source(backend, label.into(), Source::Image(image))
    }

    /// Decodes an encoded image (PNG) from `reader`.
    pub(crate) fn from_reader<R: BufRead + Seek>(
        backend: Arc<dyn Backend>,
        label: impl Into<String>,
        reader: R,
    ) -> Result<Self> {
        let image = image::ImageReader::new(reader)
            .with_guessed_format()?
            .decode()?;
        Ok(Self::from_image(backend, label, image))
    }

    /// One-dimensional RGBA lookup table from float components in 0..=1.
    pub(crate) fn from_rgba_1d(
        backend: Arc<dyn Backend>,
        label: impl Into<String>,
        values: &[f32],
    ) -> Result<Self> {
        if values.is_empty() || values.len() % 4 != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "1D RGBA texture needs a non-empty multiple of 4 values, got {}",
                values.len()
            )));
        }
        let texels = values
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let source = Source::Raw {
            width: (values.len() / 4) as u32,
            height: 1,
            format: PixelFormat::Rgba8Unorm,
            texels,
        };
        Ok(Self::with_source(backend, label.into(), source))
    }

    /// Single-channel coverage texture, drawn through the alpha pipeline variant.
    pub(crate) fn from_alpha(
        backend: Arc<dyn Backend>,
        label: impl Into<String>,
        width: u32,
        height: u32,
        coverage: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if coverage.len() != expected {
            return Err(RenderError::TexelSize {
                width,
                height,
                expected,
                actual: coverage.len(),
            });
        }
        let source = Source::Raw {
            width,
            height,
            format: PixelFormat::R8Unorm,
            texels: coverage,
        };
        Ok(Self::with_source(backend, label.into(), source))
    }

    fn with_source(backend: Arc<dyn Backend>, label: String, source: Source) -> Self {
        Self {
            backend,
            label,
            source,
            sampler: SamplerParams::default(),
            mipmaps: false,
            handle: None,
        }
    }

    /// Builds a full mip chain on every load.
    pub fn with_mipmaps(mut self, on: bool) -> Self {
        self.mipmaps = on;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        match &self.source {
            Source::Image(image) => image.width(),
            Source::Raw { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.source {
            Source::Image(image) => image.height(),
            Source::Raw { height, .. } => *height,
        }
    }

    pub fn format(&self) -> PixelFormat {
        match &self.source {
            Source::Image(_) => PixelFormat::Rgba8Unorm,
            Source::Raw { format, .. } => *format,
        }
    }

    /// Resident on the GPU.
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn sampler(&self) -> SamplerParams {
        self.sampler
    }

    pub fn set_sampler(&mut self, sampler: SamplerParams) {
        self.sampler = sampler;
        if let Some(handle) = self.handle {
            self.backend.set_sampler(handle, sampler);
        }
    }

    /// (Re)creates the GPU copy. Images must have four channels; anything
    /// else is logged and leaves the texture unloaded.
    pub fn load(&mut self) -> bool {
        self.unload();
        match self.upload() {
            Ok(handle) => {
                log::debug!("texture `{}` loaded ({}x{})", self.label, self.width(), self.height());
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                log::error!("texture `{}` not loaded: {e}", self.label);
                false
            }
        }
    }

    fn upload(&self) -> Result<TextureHandle> {
        let converted;
        let (width, height, format, texels): (u32, u32, PixelFormat, &[u8]) = match &self.source {
            Source::Image(image) => {
                let channels = image.color().channel_count();
                if channels != 4 {
                    return Err(RenderError::UnsupportedFormat {
                        channels,
                        expected: 4,
                    });
                }
                converted = image.to_rgba8();
                (converted.width(), converted.height(), PixelFormat::Rgba8Unorm, converted.as_raw())
            }
            Source::Raw {
                width,
                height,
                format,
                texels,
            } => (*width, *height, *format, texels),
        };

        let mip_levels = if self.mipmaps {
            mip_level_count(width, height)
        } else {
            1
        };
        let handle = self.backend.create_texture(&TextureDesc {
            label: self.label.clone(),
            width,
            height,
            format,
            mip_levels,
            render_target: false,
            sampler: self.sampler,
        })?;

        let filled = self.backend.write_texture(handle, texels).and_then(|()| {
            if mip_levels > 1 {
                self.backend.generate_mipmaps(handle)
            } else {
                Ok(())
            }
        });
        if let Err(e) = filled {
            self.backend.release_texture(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Loads on first use. Returns the handle when resident.
    pub fn ensure_resident(&mut self) -> Option<TextureHandle> {
        if self.handle.is_none() {
            self.load();
        }
        self.handle
    }

    /// Drops the GPU copy and keeps the pixels.
    pub fn unload(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.release_texture(handle);
        }
    }

    /// Makes this the texture sampled by textured draws.
    pub fn bind(&mut self, renderer: &mut ImmediateRenderer) {
        let alpha_only = self.format().is_alpha_only();
        match self.ensure_resident() {
            Some(handle) => renderer.bind_texture(Some(BoundTexture { handle, alpha_only })),
            None => renderer.bind_texture(None),
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.label)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn backend() -> Arc<NullBackend> {
        Arc::new(NullBackend::default())
    }

    // ── loading ───────────────────────────────────────────────────────────

    #[test]
    fn three_channel_image_stays_unloaded() {
        let b = backend();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let mut t = Texture::from_image(b.clone(), "rgb", image);
        assert!(!t.load());
        assert!(!t.is_valid());
        assert_eq!(b.live_textures(), 0);
    }

    #[test]
    fn rgba_image_uploads_pixels() {
        let b = backend();
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 1, Rgba([9, 8, 7, 6])));
        let mut t = Texture::from_image(b.clone(), "rgba", image);
        assert!(t.load());
        let handle = t.handle().unwrap();
        assert_eq!(b.read_texture(handle).unwrap(), vec![9, 8, 7, 6, 9, 8, 7, 6]);
    }

    #[test]
    fn load_twice_keeps_one_gpu_copy() {
        let b = backend();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let mut t = Texture::from_image(b.clone(), "twice", image);
        t.load();
        t.load();
        assert_eq!(b.live_textures(), 1);
    }

    #[test]
    fn unload_keeps_cpu_copy_for_reload() {
        let b = backend();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let mut t = Texture::from_image(b.clone(), "lazy", image);
        assert!(t.ensure_resident().is_some());
        t.unload();
        assert!(!t.is_valid());
        assert_eq!(b.live_textures(), 0);
        assert!(t.ensure_resident().is_some());
        drop(t);
        assert_eq!(b.live_textures(), 0);
    }

    // ── raw sources ───────────────────────────────────────────────────────

    #[test]
    fn float_lut_is_quantized() {
        let b = backend();
        let mut t = Texture::from_rgba_1d(b.clone(), "lut", &[0.0, 0.5, 1.0, 2.0]).unwrap();
        assert_eq!((t.width(), t.height()), (1, 1));
        assert!(t.load());
        assert_eq!(b.read_texture(t.handle().unwrap()).unwrap(), vec![0, 128, 255, 255]);
    }

    #[test]
    fn float_lut_rejects_partial_texels() {
        assert!(Texture::from_rgba_1d(backend(), "bad", &[0.0; 3]).is_err());
    }

    #[test]
    fn mipmapped_texture_fills_levels() {
        let b = backend();
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])));
        let mut t = Texture::from_image(b.clone(), "mips", image).with_mipmaps(true);
        assert!(t.load());
        let level2 = b.texture_level(t.handle().unwrap(), 2).unwrap();
        assert_eq!(level2.len(), 4);
        assert!((199..=201).contains(&level2[0]));
    }

    #[test]
    fn sampler_follows_resident_texture() {
        let b = backend();
        let mut t = Texture::from_alpha(b.clone(), "mask", 2, 2, vec![0, 64, 128, 255]).unwrap();
        t.load();
        let params = SamplerParams {
            wrap_s: crate::backend::WrapMode::Repeat,
            ..Default::default()
        };
        t.set_sampler(params);
        assert_eq!(b.sampler(t.handle().unwrap()), Some(params));
        assert!(t.format().is_alpha_only());
    }

    #[test]
    fn short_coverage_reports_texel_size() {
        let err = Texture::from_alpha(backend(), "mask", 4, 4, vec![0; 10]).err();
        assert!(matches!(
            err,
            Some(RenderError::TexelSize {
                expected: 16,
                actual: 10,
                ..
            })
        ));
    }
}
