//! Opens a window and draws a small scene through the kiln immediate-mode
//! renderer: fans, smoothed and stippled lines, textured quads, a retained
//! ribbon with its edges, instanced tree nodes and an offscreen pass.

mod gpu;
mod runtime;
mod scene;

use anyhow::Result;
use kiln_render::RenderConfig;
use kiln_render::logging::{LoggingConfig, init_logging};

use crate::gpu::GpuInit;
use crate::runtime::{Runtime, RuntimeConfig};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let render = RenderConfig::from_env();
    log::info!("render config: {render:?}");

    Runtime::run(
        RuntimeConfig {
            title: "kiln demo".to_string(),
            ..Default::default()
        },
        GpuInit::default(),
        render,
    )
}
