use std::collections::HashMap;
use std::io::{BufRead, Seek};
use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;
use state::InitCell;

use super::{FrameBuffer, Texture};
use crate::backend::{Api, Backend, NullBackend, NullBackendConfig, WgpuBackend};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::geometry::{DrawMode, FillerPoint, GeometryBuffer, NarrowEdge, TreeNodeGeometry};
use crate::immediate::ImmediateRenderer;
use crate::pipeline::PipelineStateCache;

/// The graphics context the process draws with.
///
/// Decides the backend once, when the [`ResourceManager`] is built.
pub enum GraphicsContext {
    Wgpu {
        device: wgpu::Device,
        queue: wgpu::Queue,
        /// Backend of the adapter the device came from.
        backend: wgpu::Backend,
    },
    Null(NullBackendConfig),
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphicsContext::Wgpu { backend, .. } => {
                f.debug_struct("Wgpu").field("backend", backend).finish_non_exhaustive()
            }
            GraphicsContext::Null(config) => f.debug_tuple("Null").field(config).finish(),
        }
    }
}

enum Concrete {
    Wgpu(Arc<WgpuBackend>),
    Null(Arc<NullBackend>),
}

pub type SharedRenderer = Arc<Mutex<ImmediateRenderer>>;

static INSTANCE: InitCell<ResourceManager> = InitCell::new();

/// Owns the backend, its pipeline cache and the renderer registry, and is
/// the only factory for GPU resources.
pub struct ResourceManager {
    config: RenderConfig,
    api: Api,
    backend: Arc<dyn Backend>,
    concrete: Concrete,
    cache: Arc<PipelineStateCache>,
    renderers: Mutex<HashMap<Api, SharedRenderer>>,
    current: Mutex<Option<Api>>,
}

impl ResourceManager {
    /// Selects the backend for `context`, builds the pipeline cache and
    /// registers a renderer for the selected API as current.
    pub fn new(context: GraphicsContext, config: RenderConfig) -> Result<Self> {
        let concrete = match context {
            GraphicsContext::Wgpu {
                device,
                queue,
                backend,
            } => Concrete::Wgpu(Arc::new(WgpuBackend::new(
                device,
                queue,
                backend,
                config.transfer_budget,
            ))),
            GraphicsContext::Null(null) => Concrete::Null(Arc::new(NullBackend::new(null))),
        };
        let backend: Arc<dyn Backend> = match &concrete {
            Concrete::Wgpu(b) => b.clone(),
            Concrete::Null(b) => b.clone(),
        };
        let api = backend.api();
        log::info!("render backend: {api:?} ({:?})", backend.caps());

        let cache = Arc::new(PipelineStateCache::new(backend.clone()));
        cache.initialize(config.color_format)?;

        let manager = Self {
            config,
            api,
            backend,
            concrete,
            cache,
            renderers: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        };
        let renderer = ImmediateRenderer::new(
            manager.backend.clone(),
            manager.cache.clone(),
            &manager.config,
        );
        manager.add_renderer(renderer);
        manager.set_current_renderer(api);
        Ok(manager)
    }

    /// Builds the process-wide manager. The first successful call wins;
    /// later calls return it and drop their context. A failed call leaves
    /// nothing behind, so it can be retried.
    pub fn init(
        context: GraphicsContext,
        config: RenderConfig,
    ) -> Result<&'static ResourceManager> {
        if let Some(existing) = INSTANCE.try_get() {
            log::debug!("resource manager already initialized; ignoring {context:?}");
            return Ok(existing);
        }
        let manager = Self::new(context, config)?;
        if !INSTANCE.set(manager) {
            log::debug!("resource manager initialized concurrently; keeping the first");
        }
        INSTANCE.try_get().ok_or(RenderError::NoContext)
    }

    /// The process-wide manager, or [`RenderError::NoContext`] before `init`.
    pub fn instance() -> Result<&'static ResourceManager> {
        INSTANCE.try_get().ok_or(RenderError::NoContext)
    }

    pub fn is_initialized() -> bool {
        INSTANCE.try_get().is_some()
    }

    pub fn get_api(&self) -> Api {
        self.api
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn pipeline_cache(&self) -> &Arc<PipelineStateCache> {
        &self.cache
    }

    /// The wgpu backend, for surface attachment.
    pub fn wgpu_backend(&self) -> Option<&Arc<WgpuBackend>> {
        match &self.concrete {
            Concrete::Wgpu(b) => Some(b),
            Concrete::Null(_) => None,
        }
    }

    pub fn null_backend(&self) -> Option<&Arc<NullBackend>> {
        match &self.concrete {
            Concrete::Null(b) => Some(b),
            Concrete::Wgpu(_) => None,
        }
    }

    // ── renderers ─────────────────────────────────────────────────────────

    /// Registers `renderer` under its API, replacing any previous one.
    pub fn add_renderer(&self, renderer: ImmediateRenderer) -> SharedRenderer {
        let api = renderer.api();
        let shared = Arc::new(Mutex::new(renderer));
        if self.renderers.lock().insert(api, shared.clone()).is_some() {
            log::debug!("replaced {api:?} renderer");
        }
        shared
    }

    pub fn renderer(&self, api: Api) -> Option<SharedRenderer> {
        self.renderers.lock().get(&api).cloned()
    }

    /// Makes the renderer for `api` current. An unregistered API clears the
    /// current renderer and returns false.
    pub fn set_current_renderer(&self, api: Api) -> bool {
        let known = self.renderers.lock().contains_key(&api);
        let mut current = self.current.lock();
        if known {
            *current = Some(api);
        } else {
            log::error!("no renderer registered for {api:?}");
            *current = None;
        }
        known
    }

    pub fn current_renderer(&self) -> Option<SharedRenderer> {
        let api = (*self.current.lock())?;
        self.renderer(api)
    }

    // ── factories ─────────────────────────────────────────────────────────

    pub fn create_geometry(&self, label: &str, mode: DrawMode) -> GeometryBuffer {
        GeometryBuffer::new(self.backend.clone(), label, mode)
    }

    pub fn create_texture(&self, label: &str, image: DynamicImage) -> Texture {
        Texture::from_image(self.backend.clone(), label, image)
    }

    pub fn create_texture_from_reader<R: BufRead + Seek>(
        &self,
        label: &str,
        reader: R,
    ) -> Result<Texture> {
        Texture::from_reader(self.backend.clone(), label, reader)
    }

    /// Lookup table of `values.len() / 4` RGBA texels.
    pub fn create_texture_1d_rgba(&self, label: &str, values: &[f32]) -> Result<Texture> {
        Texture::from_rgba_1d(self.backend.clone(), label, values)
    }

    pub fn create_alpha_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        coverage: Vec<u8>,
    ) -> Result<Texture> {
        Texture::from_alpha(self.backend.clone(), label, width, height, coverage)
    }

    /// `dim == 0` uses the configured framebuffer size.
    pub fn create_framebuffer(&self, dim: u32) -> Result<FrameBuffer> {
        let dim = if dim == 0 { self.config.framebuffer_dim } else { dim };
        FrameBuffer::new(self.backend.clone(), dim, self.config.color_format)
    }

    /// `segments == 0` uses the configured segment count.
    pub fn create_tree_node(&self, segments: u32) -> Result<TreeNodeGeometry> {
        let segments = if segments == 0 {
            self.config.tree_node_segments
        } else {
            segments
        };
        TreeNodeGeometry::new(self.backend.clone(), segments)
    }

    pub fn create_narrow_edge(&self, parent: &Arc<GeometryBuffer>) -> NarrowEdge {
        NarrowEdge::new(parent)
    }

    pub fn create_filler_points(&self, parent: &Arc<GeometryBuffer>) -> FillerPoint {
        FillerPoint::new(parent)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::backend::{BackendCaps, Topology, VertexLayout};
    use crate::geometry::NodeInstance;

    fn manager() -> ResourceManager {
        ResourceManager::new(
            GraphicsContext::Null(NullBackendConfig::default()),
            RenderConfig::default(),
        )
        .unwrap()
    }

    fn null(m: &ResourceManager) -> &Arc<NullBackend> {
        m.null_backend().unwrap()
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn new_registers_current_renderer() {
        let m = manager();
        assert_eq!(m.get_api(), Api::DebugNull);
        assert!(m.pipeline_cache().is_initialized());
        assert!(m.wgpu_backend().is_none());
        let current = m.current_renderer().unwrap();
        assert_eq!(current.lock().api(), Api::DebugNull);
    }

    #[test]
    fn reported_api_follows_context() {
        let m = ResourceManager::new(
            GraphicsContext::Null(NullBackendConfig {
                api: Api::LegacyFixedFunction,
                caps: BackendCaps::legacy(),
                fail_function: None,
            }),
            RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(m.get_api(), Api::LegacyFixedFunction);
        assert!(m.renderer(Api::LegacyFixedFunction).is_some());
    }

    #[test]
    fn failed_cache_fails_construction() {
        let result = ResourceManager::new(
            GraphicsContext::Null(NullBackendConfig {
                fail_function: Some("vs_tree_node".into()),
                ..Default::default()
            }),
            RenderConfig::default(),
        );
        assert!(matches!(result, Err(RenderError::MissingFunction(_))));
    }

    // ── registry ──────────────────────────────────────────────────────────

    #[test]
    fn unknown_renderer_clears_current() {
        let m = manager();
        assert!(!m.set_current_renderer(Api::PlatformNative));
        assert!(m.current_renderer().is_none());
        assert!(m.set_current_renderer(Api::DebugNull));
        assert!(m.current_renderer().is_some());
    }

    // ── factories ─────────────────────────────────────────────────────────

    #[test]
    fn framebuffer_zero_dim_uses_config() {
        let m = manager();
        let fb = m.create_framebuffer(0).unwrap();
        assert_eq!(fb.dim(), 512);
        assert_eq!(m.create_framebuffer(32).unwrap().dim(), 32);
    }

    #[test]
    fn reader_texture_decodes_png() {
        let m = manager();
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, image::ImageFormat::Png).unwrap();
        png.set_position(0);

        let mut t = m.create_texture_from_reader("png", png).unwrap();
        assert_eq!((t.width(), t.height()), (3, 2));
        assert!(t.load());
    }

    #[test]
    fn tree_nodes_draw_instanced() {
        let m = manager();
        let node = m.create_tree_node(0).unwrap();
        assert_eq!(node.vertex_count(), 72);

        let instances = vec![
            NodeInstance {
                center: [1.0, 2.0],
                radius: 3.0,
                color: [255, 0, 0, 255],
            };
            300
        ];
        let renderer = m.current_renderer().unwrap();
        node.draw(&renderer.lock(), &instances);

        // 4096 / 16 = 256 instances per draw.
        let draws = null(&m).draws();
        let counts: Vec<u32> = draws.iter().map(|d| d.instance_count).collect();
        assert_eq!(counts, vec![256, 44]);
        assert_eq!(draws[0].layout, VertexLayout::TreeNode);
        assert_eq!(draws[0].vertex_count, 72);
        assert_eq!(draws[0].attribute(4).unwrap()[0][0], 3.0);
    }

    #[test]
    fn derived_views_draw_subsets() {
        let m = manager();
        let mut edges = m.create_geometry("edges", DrawMode::Lines);
        let vertices: Vec<[f32; 2]> = (0..8).map(|i| [i as f32, 0.0]).collect();
        edges.set_vertices_2d(&vertices);
        edges.upload().unwrap();
        let edges = Arc::new(edges);

        let narrow = m.create_narrow_edge(&edges);
        let filler = m.create_filler_points(&edges);
        let renderer = m.current_renderer().unwrap();
        {
            let r = renderer.lock();
            narrow.draw(&r);
            filler.draw(&r);
        }

        let draws = null(&m).take_draws();
        assert_eq!((draws[0].topology, draws[0].vertex_count), (Topology::LineList, 8));
        assert_eq!(draws[0].uniforms.params[2], 1.0);
        assert_eq!(draws[1].topology, Topology::PointList);
        let xs: Vec<f32> = draws[1].positions().iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![1.0, 5.0]);

        drop(edges);
        assert!(!narrow.is_alive());
        narrow.draw(&renderer.lock());
        filler.draw(&renderer.lock());
        assert!(null(&m).draws().is_empty());
    }

    #[test]
    fn geometry_lines_use_the_line_batcher() {
        let m = manager();
        let mut g = m.create_geometry("lines", DrawMode::Lines);
        g.set_vertices_2d(&[[0.0, 0.0], [5.0, 0.0], [0.0, 1.0], [5.0, 1.0]]);
        g.set_colors_u8(&[[0, 255, 0, 255]; 4]).unwrap();
        g.draw(&m.current_renderer().unwrap().lock());

        let draws = null(&m).draws();
        let draw = &draws[0];
        assert_eq!(draw.layout, VertexLayout::Line);
        assert_eq!(draw.vertex_count, 12);
        assert_eq!(draw.colors().unwrap()[0], [0.0, 1.0, 0.0, 1.0]);
    }
}
