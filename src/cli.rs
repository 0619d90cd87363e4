use crate::classify::SourceHint;
use crate::compiler::CommandCompiler;
use crate::config::load_config;
use crate::error::ViewerError;
use crate::export::{DirectorySink, Exporter, FileSink, write_output};
use crate::orchestrator::{Orchestrator, RenderRequest};
use crate::page::{render_page, render_viewer_page};
use crate::samples;
use crate::surface::{NoopPanZoom, PanZoom};
use crate::viewer::LocalViewerOpener;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "mmdv",
    version,
    about = "Render Mermaid diagrams and Markdown documents into a pan/zoom HTML view"
)]
pub struct Args {
    /// Input file (.mmd, .md, ...) or '-' for stdin
    #[arg(short = 'i', long = "input", conflicts_with = "sample")]
    pub input: Option<PathBuf>,

    /// Output HTML page. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Render a built-in sample instead of reading input
    #[arg(long = "sample", value_parser = samples::NAMES)]
    pub sample: Option<String>,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Diagram compiler executable (overrides the config file)
    #[arg(long = "compiler")]
    pub compiler: Option<String>,

    /// Also write the detached full-viewport viewer page here
    #[arg(long = "viewer")]
    pub viewer: Option<PathBuf>,

    /// Export the rendered diagram (PNG, SVG on failure) into this directory
    #[arg(long = "export")]
    pub export: Option<PathBuf>,

    /// Preferred export location; the export directory is the fallback
    #[arg(long = "save-as")]
    pub save_as: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,
}

pub fn run(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(program) = &args.compiler {
        config.compiler.program = program.clone();
    }
    let compiler = CommandCompiler::from_config(&config.compiler);
    let opener = LocalViewerOpener::new(Box::new(|| Box::new(NoopPanZoom) as Box<dyn PanZoom>));
    let mut orchestrator =
        Orchestrator::new(config, Box::new(compiler), Box::new(NoopPanZoom), opener);
    run_with(args, &mut orchestrator)
}

/// Renders the requested input, then writes the viewer page, any export and
/// the page. The page is written even when rendering or exporting fails so
/// the status is visible; the first failure is still returned.
pub fn run_with(args: &Args, orchestrator: &mut Orchestrator<LocalViewerOpener>) -> Result<()> {
    let (text, hint) = read_input(args)?;
    orchestrator.set_text(text);
    let request = RenderRequest {
        open_viewer: args.viewer.is_some(),
    };
    let rendered = orchestrator.render_current(hint, request);
    debug!("render status: {:?}", orchestrator.surface().status());

    let mut exported = Ok(());
    if rendered.is_ok() {
        if let Some(path) = &args.viewer {
            write_viewer(orchestrator, path)?;
        }
        if args.export.is_some() || args.save_as.is_some() {
            exported = export(args, orchestrator);
        }
    }

    let surface = orchestrator.surface();
    let page = render_page(surface.content(), surface.status(), &orchestrator.config().pan_zoom)?;
    write_output(&page, args.output.as_deref())?;
    rendered?;
    exported
}

fn export(args: &Args, orchestrator: &mut Orchestrator<LocalViewerOpener>) -> Result<()> {
    if orchestrator.surface().diagram().is_none() {
        warn!("nothing to export: the input did not render as a single diagram");
        return Ok(());
    }
    let exporter = exporter_for(args, orchestrator);
    let outcome = orchestrator.export(&exporter)?;
    info!("exported {}", outcome.path.display());
    Ok(())
}

/// Completes the viewer handshake in process and writes what it displays.
fn write_viewer(orchestrator: &mut Orchestrator<LocalViewerOpener>, path: &Path) -> Result<()> {
    if orchestrator.surface().diagram().is_none() {
        warn!(
            "not writing {}: the viewer only shows a single diagram",
            path.display()
        );
        return Ok(());
    }
    let Some(viewer) = orchestrator.opener_mut().viewer_mut() else {
        // Blocked: the status already carries the warning.
        return Ok(());
    };
    viewer.announce_ready()?;
    orchestrator.poll_viewer()?;

    let options = orchestrator.config().pan_zoom.clone();
    let Some(viewer) = orchestrator.opener_mut().viewer_mut() else {
        return Ok(());
    };
    viewer.pump();
    let surface = viewer.surface();
    let page = render_viewer_page(surface.content(), surface.status(), &options)?;
    write_output(&page, Some(path))?;
    info!("wrote viewer page to {}", path.display());
    Ok(())
}

fn exporter_for(args: &Args, orchestrator: &Orchestrator<LocalViewerOpener>) -> Exporter {
    let download_dir = args
        .export
        .clone()
        .or_else(|| {
            args.save_as
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| PathBuf::from("."));
    let exporter = Exporter::new(
        orchestrator.config().export.clone(),
        Box::new(DirectorySink::new(download_dir)),
    );
    match &args.save_as {
        Some(path) => exporter.with_picker(Box::new(FileSink::new(path.clone()))),
        None => exporter,
    }
}

fn read_input(args: &Args) -> Result<(String, SourceHint)> {
    if let Some(name) = &args.sample {
        let text = samples::sample(name).ok_or_else(|| ViewerError::UnknownSample(name.clone()))?;
        return Ok((text.to_string(), SourceHint::Diagram));
    }
    match args.input.as_deref() {
        Some(path) if path != Path::new("-") => {
            let bytes = std::fs::read(path)
                .map_err(|err| ViewerError::Read(err.to_string()))
                .with_context(|| format!("reading {}", path.display()))?;
            let text = String::from_utf8(bytes).map_err(|err| ViewerError::Read(err.to_string()))?;
            Ok((text, SourceHint::from_path(path)))
        }
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok((buf, SourceHint::None))
        }
    }
}
