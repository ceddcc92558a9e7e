/// Linear RGBA color with `f32` channels in `0..=1`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub fn from_f64(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self::new(r as f32, g as f32, b as f32, a as f32)
    }

    #[inline]
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Quantizes to 8-bit channels, clamping out-of-range values.
    pub fn to_u8(self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl From<[f32; 4]> for Rgba {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_round_trip_is_exact_on_endpoints() {
        let c = Rgba::from_u8(0, 255, 128, 255);
        assert_eq!(c.to_u8(), [0, 255, 128, 255]);
    }

    #[test]
    fn to_u8_clamps() {
        assert_eq!(Rgba::new(-1.0, 2.0, 0.5, 1.0).to_u8(), [0, 255, 128, 255]);
    }
}
