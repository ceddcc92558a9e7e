use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use super::PixelFormat;
use crate::error::{RenderError, Result};

/// Number of levels in a full chain down to 1x1.
pub(crate) fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[inline]
pub(crate) fn level_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Downsamples `level0` into levels `1..levels`, each from the one above it.
pub(crate) fn mip_chain(
    level0: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    levels: u32,
) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(levels.saturating_sub(1) as usize);
    let mut prev = level0.to_vec();

    for level in 1..levels {
        let (pw, ph) = level_extent(width, height, level - 1);
        let (w, h) = level_extent(width, height, level);

        let next = if format.is_alpha_only() {
            let img = GrayImage::from_raw(pw, ph, prev).ok_or_else(|| wrong_size(level - 1))?;
            imageops::resize(&img, w, h, FilterType::Triangle).into_raw()
        } else {
            let img = RgbaImage::from_raw(pw, ph, prev).ok_or_else(|| wrong_size(level - 1))?;
            imageops::resize(&img, w, h, FilterType::Triangle).into_raw()
        };

        out.push(next.clone());
        prev = next;
    }

    Ok(out)
}

fn wrong_size(level: u32) -> RenderError {
    RenderError::Backend(format!("mip level {level} has wrong size"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_count_reaches_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(300, 2), 9);
    }

    #[test]
    fn chain_of_uniform_image_stays_uniform() {
        let level0 = [10u8, 20, 30, 255].repeat(8 * 8);
        let chain = mip_chain(&level0, 8, 8, PixelFormat::Rgba8Unorm, 4).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].len(), 4 * 4 * 4);
        assert_eq!(&chain[2][..], &[10, 20, 30, 255]);
    }

    #[test]
    fn chain_rejects_short_input() {
        assert!(mip_chain(&[0u8; 3], 2, 2, PixelFormat::Rgba8Unorm, 2).is_err());
    }
}
