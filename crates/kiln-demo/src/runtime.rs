use std::time::Instant;

use anyhow::{Context, Result};
use kiln_render::backend::gpu::pixel_format;
use kiln_render::{GraphicsContext, RenderConfig, ResourceManager};
use ouroboros::self_referencing;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::gpu::{Gpu, GpuInit, SurfaceErrorAction};
use crate::scene::Scene;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            initial_size: LogicalSize::new(660.0, 520.0),
        }
    }
}

pub struct Runtime;

impl Runtime {
    pub fn run(window: RuntimeConfig, gpu_init: GpuInit, render: RenderConfig) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            window,
            gpu_init,
            render: Some(render),
            entry: None,
            scene: None,
            started: Instant::now(),
            exit_requested: false,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState {
    window: RuntimeConfig,
    gpu_init: GpuInit,
    /// Taken when the resource manager is initialized.
    render: Option<RenderConfig>,
    entry: Option<WindowEntry>,
    scene: Option<Scene>,
    started: Instant,
    exit_requested: bool,
}

impl AppState {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.window.title.clone())
            .with_inner_size(self.window.initial_size);
        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()?;

        if !ResourceManager::is_initialized() {
            let (context, format) = entry.with_gpu(|gpu| {
                let context = GraphicsContext::Wgpu {
                    device: gpu.device().clone(),
                    queue: gpu.queue().clone(),
                    backend: gpu.adapter_backend(),
                };
                (context, gpu.surface_format())
            });
            let format = pixel_format(format)
                .with_context(|| format!("unsupported surface format {format:?}"))?;
            let config = self.render.take().unwrap_or_default().with_color_format(format);
            let manager = ResourceManager::init(context, config)?;
            self.scene = Some(Scene::new(manager)?);
        }

        entry.with_window(|w| w.request_redraw());
        self.entry = Some(entry);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(entry), Some(scene)) = (self.entry.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };
        let manager = ResourceManager::instance()?;
        let backend = manager.wgpu_backend().context("resource manager is not on wgpu")?;
        let renderer = manager.current_renderer().context("no current renderer")?;
        let seconds = self.started.elapsed().as_secs_f64();

        let mut fatal = false;
        entry.with_gpu_mut(|gpu| -> Result<()> {
            let size = gpu.size();
            if size.width == 0 || size.height == 0 {
                return Ok(());
            }
            let (frame, view) = match gpu.acquire() {
                Ok(acquired) => acquired,
                Err(err) => {
                    log::warn!("surface error: {err:?}");
                    let action = gpu.handle_surface_error(err);
                    fatal = action == SurfaceErrorAction::Fatal;
                    return Ok(());
                }
            };

            backend.attach_screen(view, gpu.surface_format(), (size.width, size.height));
            let drawn = scene.draw(&mut renderer.lock(), size.width, size.height, seconds);
            let detached = backend.detach_screen();
            frame.present();
            drawn?;
            detached?;
            Ok(())
        })?;

        if fatal {
            self.exit_requested = true;
        }
        Ok(())
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            log::error!("failed to open window: {e:#}");
            self.exit_requested = true;
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.exit_requested = true,

            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                self.exit_requested = true;
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.entry.as_mut() {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    log::error!("frame failed: {e:#}");
                    self.exit_requested = true;
                }
            }

            _ => {}
        }

        if self.exit_requested {
            // Resources go before the surface they were drawn to.
            self.scene = None;
            self.entry = None;
            event_loop.exit();
        }
    }
}
