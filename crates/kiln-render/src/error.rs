use thiserror::Error;

/// Errors surfaced by construction and initialization paths.
///
/// Per-draw problems are never reported through this type; they are logged
/// and the draw is skipped.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no graphics context has been registered")]
    NoContext,

    #[error("shader function `{0}` is missing")]
    MissingFunction(String),

    #[error("failed to compile pipeline `{name}`: {reason}")]
    PipelineCompile { name: String, reason: String },

    #[error("unsupported pixel layout: {channels} channel(s), expected {expected}")]
    UnsupportedFormat { channels: u8, expected: u8 },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("texel data for {width}x{height} needs {expected} bytes, got {actual}")]
    TexelSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
