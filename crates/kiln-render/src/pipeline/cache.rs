//! Compiled pipeline handles, built once per backend.

use std::sync::Arc;

use parking_lot::RwLock;

use super::catalog::{BLEND_FAMILIES, NamedPipeline, PipelineCategory};
use crate::backend::{Backend, BlendMode, PipelineDesc, PipelineHandle, PixelFormat};
use crate::error::Result;

/// Blend and texture state that picks one handle out of a category's family.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PipelineQuery {
    pub blend_enabled: bool,
    /// Ignored while blending is disabled.
    pub blend_mode: BlendMode,
    /// Bound texture carries coverage in a single channel.
    pub texture_alpha: bool,
}

struct PipelineSet {
    color_format: PixelFormat,
    /// `families[blend][category]`, blend in `BLEND_FAMILIES` order.
    families: [[PipelineHandle; 8]; 3],
    named: [PipelineHandle; 5],
}

impl PipelineSet {
    fn handles(&self) -> impl Iterator<Item = PipelineHandle> + '_ {
        self.families.iter().flatten().chain(self.named.iter()).copied()
    }
}

/// Every pipeline the renderer can select, compiled against one backend.
pub struct PipelineStateCache {
    backend: Arc<dyn Backend>,
    set: RwLock<Option<PipelineSet>>,
}

impl PipelineStateCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            set: RwLock::new(None),
        }
    }

    /// Compiles the whole catalog. A populated cache returns immediately; a
    /// failed compile releases everything built so far and leaves the cache
    /// empty.
    pub fn initialize(&self, color_format: PixelFormat) -> Result<()> {
        let mut slot = self.set.write();
        if let Some(set) = slot.as_ref() {
            if set.color_format != color_format {
                log::warn!(
                    "pipeline cache already built for {:?}, ignoring {:?}",
                    set.color_format,
                    color_format
                );
            }
            return Ok(());
        }

        let mut built = Vec::with_capacity(29);
        match self.build(color_format, &mut built) {
            Ok(set) => {
                log::debug!(
                    "pipeline cache: {} pipelines for {:?} on {:?}",
                    built.len(),
                    color_format,
                    self.backend.api()
                );
                *slot = Some(set);
                Ok(())
            }
            Err(e) => {
                log::error!("pipeline cache: {e}; releasing {} pipelines", built.len());
                for handle in built {
                    self.backend.release_pipeline(handle);
                }
                Err(e)
            }
        }
    }

    fn build(
        &self,
        color_format: PixelFormat,
        built: &mut Vec<PipelineHandle>,
    ) -> Result<PipelineSet> {
        let mut compile = |desc: PipelineDesc| -> Result<PipelineHandle> {
            let handle = self.backend.compile_pipeline(&desc)?;
            built.push(handle);
            Ok(handle)
        };

        let mut families = [[PipelineHandle(0); 8]; 3];
        for (b, blend) in BLEND_FAMILIES.into_iter().enumerate() {
            for category in PipelineCategory::ALL {
                families[b][category.index()] = compile(PipelineDesc {
                    label: format!("{category:?}/{blend:?}"),
                    vertex_fn: category.vertex_fn(),
                    fragment_fn: category.fragment_fn(),
                    layout: category.layout(),
                    blend,
                    color_format,
                })?;
            }
        }

        let mut named = [PipelineHandle(0); 5];
        for pipeline in NamedPipeline::ALL {
            named[pipeline as usize] = compile(PipelineDesc {
                label: pipeline.label().to_owned(),
                vertex_fn: pipeline.vertex_fn(),
                fragment_fn: pipeline.fragment_fn(),
                layout: pipeline.layout(),
                blend: pipeline.blend(),
                color_format,
            })?;
        }

        Ok(PipelineSet {
            color_format,
            families,
            named,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.set.read().is_some()
    }

    pub fn color_format(&self) -> Option<PixelFormat> {
        self.set.read().as_ref().map(|s| s.color_format)
    }

    /// Resolves a category index to a handle for the given blend state.
    pub fn get_pipeline_state(&self, index: usize, query: PipelineQuery) -> Option<PipelineHandle> {
        let category = PipelineCategory::from_index(index)?;
        self.get(category, query)
    }

    pub fn get(&self, category: PipelineCategory, query: PipelineQuery) -> Option<PipelineHandle> {
        let category = match category {
            PipelineCategory::Texture if query.texture_alpha => PipelineCategory::TextureAlpha,
            other => other,
        };
        let family = match (query.blend_enabled, query.blend_mode) {
            (false, _) => 0,
            (true, BlendMode::InverseDestination) => 2,
            (true, _) => 1,
        };
        let set = self.set.read();
        set.as_ref().map(|s| s.families[family][category.index()])
    }

    pub fn named(&self, pipeline: NamedPipeline) -> Option<PipelineHandle> {
        self.set.read().as_ref().map(|s| s.named[pipeline as usize])
    }

    /// All handles currently owned by the cache.
    pub fn handles(&self) -> Vec<PipelineHandle> {
        self.set
            .read()
            .as_ref()
            .map(|s| s.handles().collect())
            .unwrap_or_default()
    }

    /// Releases every pipeline; the next `initialize` rebuilds them.
    pub fn release(&self) {
        if let Some(set) = self.set.write().take() {
            for handle in set.handles() {
                self.backend.release_pipeline(handle);
            }
        }
    }
}

impl Drop for PipelineStateCache {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, NullBackendConfig};

    fn cache_with(config: NullBackendConfig) -> (Arc<NullBackend>, PipelineStateCache) {
        let backend = Arc::new(NullBackend::new(config));
        let cache = PipelineStateCache::new(backend.clone());
        (backend, cache)
    }

    // ── initialize ────────────────────────────────────────────────────────

    #[test]
    fn second_initialize_keeps_handles() {
        let (backend, cache) = cache_with(NullBackendConfig::default());
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        let first = cache.handles();
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();

        assert_eq!(first.len(), 8 * 3 + 5);
        assert_eq!(cache.handles(), first);
        assert_eq!(backend.compiled_total(), first.len());
        assert_eq!(backend.live_pipelines(), first.len());
    }

    #[test]
    fn failed_compile_releases_everything() {
        let (backend, cache) = cache_with(NullBackendConfig {
            fail_function: Some("fs_line_stipple".into()),
            ..Default::default()
        });
        assert!(cache.initialize(PixelFormat::Rgba8Unorm).is_err());
        assert!(!cache.is_initialized());
        assert!(backend.compiled_total() > 0);
        assert_eq!(backend.live_pipelines(), 0);
    }

    #[test]
    fn drop_releases_pipelines() {
        let (backend, cache) = cache_with(NullBackendConfig::default());
        cache.initialize(PixelFormat::Bgra8Unorm).unwrap();
        drop(cache);
        assert_eq!(backend.live_pipelines(), 0);
    }

    // ── lookup ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_before_initialize_is_none() {
        let (_backend, cache) = cache_with(NullBackendConfig::default());
        assert_eq!(cache.get_pipeline_state(0, PipelineQuery::default()), None);
        assert_eq!(cache.named(NamedPipeline::Line), None);
    }

    #[test]
    fn out_of_range_index_is_none() {
        let (_backend, cache) = cache_with(NullBackendConfig::default());
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        assert_eq!(cache.get_pipeline_state(8, PipelineQuery::default()), None);
    }

    #[test]
    fn blend_state_selects_family() {
        let (_backend, cache) = cache_with(NullBackendConfig::default());
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();

        let opaque = cache.get_pipeline_state(1, PipelineQuery::default()).unwrap();
        let disabled = cache
            .get_pipeline_state(
                1,
                PipelineQuery {
                    blend_enabled: false,
                    blend_mode: BlendMode::InverseDestination,
                    texture_alpha: false,
                },
            )
            .unwrap();
        let alpha = cache
            .get_pipeline_state(
                1,
                PipelineQuery {
                    blend_enabled: true,
                    blend_mode: BlendMode::Alpha,
                    texture_alpha: false,
                },
            )
            .unwrap();
        let inverse = cache
            .get_pipeline_state(
                1,
                PipelineQuery {
                    blend_enabled: true,
                    blend_mode: BlendMode::InverseDestination,
                    texture_alpha: false,
                },
            )
            .unwrap();

        assert_eq!(opaque, disabled);
        assert_ne!(opaque, alpha);
        assert_ne!(alpha, inverse);
    }

    #[test]
    fn alpha_texture_substitutes_variant() {
        let (_backend, cache) = cache_with(NullBackendConfig::default());
        cache.initialize(PixelFormat::Rgba8Unorm).unwrap();
        let query = PipelineQuery {
            texture_alpha: true,
            ..Default::default()
        };
        assert_eq!(
            cache.get_pipeline_state(2, query),
            cache.get(PipelineCategory::TextureAlpha, PipelineQuery::default())
        );
        // Only the 2D texture category has an alpha variant.
        assert_eq!(
            cache.get_pipeline_state(7, query),
            cache.get(PipelineCategory::Texture1D, PipelineQuery::default())
        );
    }
}
