//! Render Mermaid diagrams, or Markdown documents embedding them, onto a
//! pannable surface with an optional detached viewer and PNG export.

pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod export;
pub mod markup;
pub mod normalize;
pub mod orchestrator;
pub mod page;
pub mod samples;
pub mod sanitize;
pub mod scan;
pub mod surface;
pub mod svg;
pub mod viewer;

pub use classify::{Classification, RenderMode, SourceHint, classify};
#[cfg(feature = "cli")]
pub use cli::run;
pub use compiler::{CommandCompiler, CompileError, DiagramCompiler};
pub use config::{Config, load_config};
pub use error::ViewerError;
pub use export::{ExportFormat, ExportOutcome, Exporter, SaveRoute, SaveSink};
pub use markup::{DocumentBlock, compile_markup, split_blocks};
pub use normalize::{clean_boundaries, compile_with_repair};
pub use orchestrator::{Orchestrator, RenderOutcome, RenderRequest, RenderState};
pub use sanitize::{is_blank, sanitize};
pub use surface::{PanZoom, PanZoomHandle, Status, Surface};
pub use viewer::{Message, ViewerChannel, ViewerOpener};
