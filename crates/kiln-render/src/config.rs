use crate::backend::PixelFormat;

/// Renderer-wide configuration.
///
/// Passed to [`crate::ResourceManager`] at construction; every renderer and
/// geometry created through the manager reads its limits from here.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Upper bound, in bytes, of vertex data sent with a single chunked draw.
    ///
    /// Only honored by backends that report a transfer budget in their caps.
    pub transfer_budget: usize,

    /// Wedge count of the shared tree-node disc.
    pub tree_node_segments: u32,

    /// Edge length of framebuffers created with a zero dimension.
    pub framebuffer_dim: u32,

    /// Color target format the pipeline cache compiles against.
    pub color_format: PixelFormat,

    /// Width in pixels of the alpha falloff on smoothed lines.
    pub line_feather: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            transfer_budget: 4096,
            tree_node_segments: 24,
            framebuffer_dim: 512,
            color_format: PixelFormat::Rgba8Unorm,
            line_feather: 1.0,
        }
    }
}

impl RenderConfig {
    /// Defaults overridden by `KILN_TRANSFER_BUDGET` and `KILN_TREE_NODE_SEGMENTS`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_number::<usize>("KILN_TRANSFER_BUDGET") {
            config.transfer_budget = v;
        }
        if let Some(v) = env_number::<u32>("KILN_TREE_NODE_SEGMENTS") {
            config.tree_node_segments = v;
        }

        config
    }

    /// Returns the config with a different color target.
    pub fn with_color_format(mut self, format: PixelFormat) -> Self {
        self.color_format = format;
        self
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::error!("ignoring {key}={raw:?}: not a number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_transfer_limits() {
        let c = RenderConfig::default();
        assert_eq!(c.transfer_budget, 4096);
        assert_eq!(c.framebuffer_dim, 512);
        assert_eq!(c.color_format, PixelFormat::Rgba8Unorm);
    }

    #[test]
    fn env_number_rejects_garbage() {
        // Unique key so parallel tests never race on it.
        unsafe { std::env::set_var("KILN_TEST_ENV_NUMBER", "lots") };
        assert_eq!(env_number::<usize>("KILN_TEST_ENV_NUMBER"), None);
        unsafe { std::env::set_var("KILN_TEST_ENV_NUMBER", " 128 ") };
        assert_eq!(env_number::<usize>("KILN_TEST_ENV_NUMBER"), Some(128));
        unsafe { std::env::remove_var("KILN_TEST_ENV_NUMBER") };
    }

    #[test]
    fn with_color_format_overrides() {
        let c = RenderConfig::default().with_color_format(PixelFormat::Bgra8UnormSrgb);
        assert_eq!(c.color_format, PixelFormat::Bgra8UnormSrgb);
    }
}
