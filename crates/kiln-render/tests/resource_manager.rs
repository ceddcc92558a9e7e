//! The process-wide manager can only be initialized once per process, so
//! the whole lifecycle is checked in a single test.

use kiln_render::backend::{BackendCaps, NullBackendConfig};
use kiln_render::geometry::DrawMode;
use kiln_render::{Api, GraphicsContext, RenderConfig, RenderError, ResourceManager};

#[test]
fn init_lifecycle() {
    assert!(!ResourceManager::is_initialized());
    assert!(matches!(ResourceManager::instance(), Err(RenderError::NoContext)));

    // A context whose pipelines cannot compile fails without poisoning init.
    let broken = GraphicsContext::Null(NullBackendConfig {
        fail_function: Some("fs_texture".into()),
        ..Default::default()
    });
    assert!(ResourceManager::init(broken, RenderConfig::default()).is_err());
    assert!(!ResourceManager::is_initialized());

    let manager = ResourceManager::init(
        GraphicsContext::Null(NullBackendConfig::default()),
        RenderConfig::default(),
    )
    .expect("retry after a failed init succeeds");
    assert!(ResourceManager::is_initialized());
    assert_eq!(manager.get_api(), Api::DebugNull);

    // First success wins.
    let again = ResourceManager::init(
        GraphicsContext::Null(NullBackendConfig {
            api: Api::LegacyFixedFunction,
            caps: BackendCaps::legacy(),
            fail_function: None,
        }),
        RenderConfig::default(),
    )
    .unwrap();
    assert!(std::ptr::eq(manager, again));
    assert_eq!(ResourceManager::instance().unwrap().get_api(), Api::DebugNull);

    // The registered renderer draws through the selected backend.
    let renderer = manager.current_renderer().expect("current renderer");
    {
        let mut r = renderer.lock();
        r.begin(DrawMode::Triangles);
        r.vertex2f(0.0, 0.0);
        r.vertex2f(1.0, 0.0);
        r.vertex2f(0.0, 1.0);
        r.end();
    }
    let null = manager.null_backend().expect("null backend");
    assert_eq!(null.draws().len(), 1);
}
