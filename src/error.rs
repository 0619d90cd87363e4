use crate::compiler::CompileError;
use thiserror::Error;

/// Failures surfaced by a render cycle, the viewer channel or export.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Please provide content to render.")]
    EmptyInput,

    #[error("Render failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Popup blocked. Allow popups to open the full viewer.")]
    ViewerUnavailable,

    #[error("{0}")]
    Export(String),

    #[error("Failed to read file: {0}")]
    Read(String),

    #[error("unknown sample: {0}")]
    UnknownSample(String),

    #[error("viewer window is closed")]
    ChannelClosed,

    #[error("malformed viewer message: {0}")]
    Message(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
