//! Pipeline state catalog and cache.

pub mod cache;
pub mod catalog;

pub use cache::{PipelineQuery, PipelineStateCache};
pub use catalog::{NamedPipeline, PipelineCategory};
