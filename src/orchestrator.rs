//! One render cycle from raw text to a mounted surface.

use crate::classify::{RenderMode, SourceHint, classify};
use crate::compiler::{CompileError, DiagramCompiler};
use crate::config::Config;
use crate::error::ViewerError;
use crate::export::{ExportOutcome, Exporter};
use crate::markup::{DocumentBlock, compile_markup, escape_html, placeholder, split_blocks};
use crate::normalize::compile_with_repair;
use crate::samples;
use crate::sanitize::{is_blank, sanitize};
use crate::surface::{PanZoom, Status, Surface};
use crate::svg;
use crate::viewer::{ViewerChannel, ViewerOpener};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;

const PLAIN_STATUS: &str = "Rendered as plain text (no Mermaid diagram detected).";
const DIAGRAM_STATUS: &str = "Rendered. Scroll to zoom, drag to pan.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderState {
    Idle,
    Classifying,
    DiagramRendering,
    MarkupRendering,
    Mounted,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderRequest {
    /// Open (or reuse) the detached viewer as part of this cycle.
    pub open_viewer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOutcome {
    pub mode: RenderMode,
    pub status: Status,
    pub diagrams: usize,
    pub failed: usize,
    /// Whether the SVG went straight to a ready viewer.
    pub delivered: bool,
}

pub struct Orchestrator<O: ViewerOpener> {
    config: Config,
    compiler: Box<dyn DiagramCompiler>,
    opener: O,
    surface: Surface,
    viewer: Option<ViewerChannel>,
    state: RenderState,
    history: Vec<RenderState>,
    cycle: u64,
    text: String,
}

impl<O: ViewerOpener> Orchestrator<O> {
    pub fn new(
        config: Config,
        compiler: Box<dyn DiagramCompiler>,
        pan_zoom: Box<dyn PanZoom>,
        opener: O,
    ) -> Self {
        Self {
            config,
            compiler,
            opener,
            surface: Surface::new(pan_zoom),
            viewer: None,
            state: RenderState::Idle,
            history: Vec::new(),
            cycle: 0,
            text: String::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn opener_mut(&mut self) -> &mut O {
        &mut self.opener
    }

    pub fn viewer(&self) -> Option<&ViewerChannel> {
        self.viewer.as_ref()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// States visited by the most recent cycle, ending in `Idle`.
    pub fn history(&self) -> &[RenderState] {
        &self.history
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Renders the stored text.
    pub fn render_current(
        &mut self,
        hint: SourceHint,
        request: RenderRequest,
    ) -> Result<RenderOutcome, ViewerError> {
        let text = self.text.clone();
        self.render(&text, hint, request)
    }

    pub fn render(
        &mut self,
        raw: &str,
        hint: SourceHint,
        request: RenderRequest,
    ) -> Result<RenderOutcome, ViewerError> {
        self.history.clear();
        let result = self.run_cycle(raw, hint, request);
        if result.is_err() {
            self.transition(RenderState::Error);
        }
        self.transition(RenderState::Idle);
        result
    }

    fn run_cycle(
        &mut self,
        raw: &str,
        hint: SourceHint,
        request: RenderRequest,
    ) -> Result<RenderOutcome, ViewerError> {
        let text = sanitize(raw);
        if is_blank(&text) {
            let err = ViewerError::EmptyInput;
            self.surface.set_status(err.to_string(), true);
            return Err(err);
        }

        self.cycle += 1;
        self.transition(RenderState::Classifying);
        let classification = classify(&text, hint);
        debug!("cycle {} classified as {:?}", self.cycle, classification.mode);

        if let (RenderMode::Diagram, Some(source)) =
            (classification.mode, &classification.diagram_source)
        {
            return self.render_diagram(source, request);
        }
        if request.open_viewer {
            warn!("viewer not opened: the input is not a single diagram");
        }
        match classification.mode {
            RenderMode::Markup => Ok(self.render_markup(&text)),
            _ => Ok(self.render_plain(&text)),
        }
    }

    fn render_plain(&mut self, text: &str) -> RenderOutcome {
        self.surface
            .mount(&format!("<pre class=\"plain-text\">{}</pre>", escape_html(text)));
        self.surface.set_status(PLAIN_STATUS, false);
        self.transition(RenderState::Mounted);
        self.outcome(RenderMode::Plain, 0, 0, false)
    }

    fn render_diagram(
        &mut self,
        source: &str,
        request: RenderRequest,
    ) -> Result<RenderOutcome, ViewerError> {
        // The viewer is opened before compiling so the open belongs to the
        // triggering action.
        let blocked = request.open_viewer && !self.ensure_viewer();
        self.surface.clear();
        self.transition(RenderState::DiagramRendering);
        self.surface.set_status("Rendering...", false);

        let id = format!("mermaid-diagram-{}", self.cycle);
        let markup = compile_with_repair(self.compiler.as_ref(), &id, source)
            .and_then(|markup| {
                if markup.contains("<svg") {
                    Ok(markup)
                } else {
                    Err(CompileError::new("No SVG output"))
                }
            });
        let markup = match markup {
            Ok(markup) => markup,
            Err(err) => {
                let err = ViewerError::from(err);
                self.surface.set_status(err.to_string(), true);
                self.close_viewer();
                return Err(err);
            }
        };

        self.surface.mount_diagram(&svg::strip_size(&markup));
        let delivered = self.stream_to_viewer(markup);
        if blocked {
            self.surface.set_status(
                format!("{DIAGRAM_STATUS} {}", ViewerError::ViewerUnavailable),
                true,
            );
        } else {
            self.surface.set_status(DIAGRAM_STATUS, false);
        }
        self.transition(RenderState::Mounted);
        Ok(self.outcome(RenderMode::Diagram, 1, 0, delivered))
    }

    fn render_markup(&mut self, text: &str) -> RenderOutcome {
        self.transition(RenderState::MarkupRendering);
        let blocks = split_blocks(text, &format!("mermaid-diagram-{}", self.cycle));
        let fragment: Vec<String> = blocks
            .iter()
            .map(|block| match block {
                DocumentBlock::Markup { content } => compile_markup(content),
                DocumentBlock::Diagram { id, .. } => placeholder(id),
            })
            .collect();
        self.surface.mount(&fragment.join("\n"));
        self.surface.set_status("Rendering...", false);

        let mut diagrams = 0;
        let mut failed = 0;
        for block in &blocks {
            let DocumentBlock::Diagram { content, id } = block else {
                continue;
            };
            diagrams += 1;
            let html = match compile_with_repair(self.compiler.as_ref(), id, content) {
                Ok(markup) => markup,
                Err(err) => {
                    failed += 1;
                    format!(
                        "<div class=\"mermaid-error\">Render failed: {}</div>",
                        escape_html(&err.message)
                    )
                }
            };
            if !self.surface.fill_placeholder(id, &html) {
                debug!("dropping result for stale block {id}");
            }
        }

        if failed == 0 {
            self.surface
                .set_status(format!("Rendered document with {diagrams} diagram(s)."), false);
        } else {
            warn!("{failed} of {diagrams} diagram block(s) failed");
            self.surface.set_status(
                format!("Rendered document; {failed} of {diagrams} diagram(s) failed."),
                true,
            );
        }
        self.transition(RenderState::Mounted);
        self.outcome(RenderMode::Markup, diagrams, failed, false)
    }

    /// Loads file content and renders it with a hint from the file name.
    /// Undecodable content leaves the stored text untouched.
    pub fn load_file(&mut self, name: &str, bytes: &[u8]) -> Result<RenderOutcome, ViewerError> {
        let text = match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(err) => {
                let err = ViewerError::Read(err.to_string());
                self.surface.set_status(err.to_string(), true);
                return Err(err);
            }
        };
        info!("loaded {name}");
        self.text = text;
        self.render_current(SourceHint::from_path(Path::new(name)), RenderRequest::default())
    }

    pub fn open_file(&mut self, path: &Path) -> Result<RenderOutcome, ViewerError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = ViewerError::Read(err.to_string());
                self.surface.set_status(err.to_string(), true);
                return Err(err);
            }
        };
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        self.load_file(name, &bytes)
    }

    pub fn load_sample(&mut self, name: &str) -> Result<RenderOutcome, ViewerError> {
        let sample = samples::sample(name)
            .ok_or_else(|| ViewerError::UnknownSample(name.to_string()))?;
        self.text = sample.to_string();
        self.render_current(SourceHint::Diagram, RenderRequest::default())
    }

    pub fn reset_view(&mut self) {
        self.surface.reset_view();
    }

    pub fn resize(&mut self) {
        self.surface.resize();
    }

    /// Feeds messages from the viewer into the channel. Returns how many
    /// payloads were delivered.
    pub fn poll_viewer(&mut self) -> Result<usize, ViewerError> {
        if self.viewer.as_ref().is_some_and(ViewerChannel::is_closed) {
            debug!("viewer went away");
            self.viewer = None;
        }
        match self.viewer.as_mut() {
            Some(channel) => channel.pump(),
            None => Ok(0),
        }
    }

    /// Exports the mounted single diagram.
    pub fn export(&mut self, exporter: &Exporter) -> Result<ExportOutcome, ViewerError> {
        let Some(svg) = self.surface.diagram().map(str::to_string) else {
            let err = ViewerError::Export("No diagram to export.".to_string());
            self.surface.set_status(err.to_string(), true);
            return Err(err);
        };
        match exporter.export(&svg) {
            Ok(outcome) => {
                self.surface.set_status(outcome.describe(), outcome.is_fallback());
                Ok(outcome)
            }
            Err(err) => {
                self.surface.set_status(format!("Save failed: {err}"), true);
                Err(err)
            }
        }
    }

    /// Reuses a live viewer (keeping its readiness) or opens a new one.
    fn ensure_viewer(&mut self) -> bool {
        if self.viewer.as_ref().is_some_and(|channel| !channel.is_closed()) {
            return true;
        }
        self.viewer = None;
        match self.opener.open() {
            Some(port) => {
                info!("opened viewer");
                self.viewer = Some(ViewerChannel::new(port));
                true
            }
            None => {
                warn!("viewer open was blocked");
                false
            }
        }
    }

    fn stream_to_viewer(&mut self, markup: String) -> bool {
        let Some(channel) = self.viewer.as_mut() else {
            return false;
        };
        match channel.send(markup) {
            Ok(delivered) => delivered,
            Err(err) => {
                debug!("dropping viewer: {err}");
                self.viewer = None;
                false
            }
        }
    }

    fn close_viewer(&mut self) {
        if let Some(mut channel) = self.viewer.take() {
            info!("closing viewer after failed render");
            channel.close();
        }
    }

    fn transition(&mut self, next: RenderState) {
        self.state = next;
        self.history.push(next);
    }

    fn outcome(
        &self,
        mode: RenderMode,
        diagrams: usize,
        failed: usize,
        delivered: bool,
    ) -> RenderOutcome {
        RenderOutcome {
            mode,
            status: self.surface.status().clone(),
            diagrams,
            failed,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::NoopPanZoom;
    use crate::surface::testing::RecordingPanZoom;
    use crate::config::ExportConfig;
    use crate::export::SaveSink;
    use crate::viewer::{ChannelState, LocalViewerOpener};
    use std::path::PathBuf;

    fn fake(id: &str, source: &str) -> Result<String, CompileError> {
        if source.contains("broken") {
            return Err(CompileError::new("Parse error on line 2"));
        }
        Ok(format!("<svg id=\"{id}\" width=\"10\" height=\"5\"><g/></svg>"))
    }

    fn opener() -> LocalViewerOpener {
        LocalViewerOpener::new(Box::new(|| Box::new(NoopPanZoom) as Box<dyn PanZoom>))
    }

    fn orchestrator() -> Orchestrator<LocalViewerOpener> {
        Orchestrator::new(Config::default(), Box::new(fake), Box::new(NoopPanZoom), opener())
    }

    #[test]
    fn diagram_cycle_walks_states() {
        let mut orch = orchestrator();
        let outcome = orch
            .render("graph TD\nA-->B", SourceHint::None, RenderRequest::default())
            .unwrap();
        assert_eq!(outcome.mode, RenderMode::Diagram);
        assert_eq!(outcome.status.message, DIAGRAM_STATUS);
        assert_eq!(
            orch.history(),
            [
                RenderState::Classifying,
                RenderState::DiagramRendering,
                RenderState::Mounted,
                RenderState::Idle
            ]
        );
        let mounted = orch.surface().diagram().unwrap();
        assert!(mounted.contains("id=\"mermaid-diagram-1\""));
        assert!(!mounted.contains("width="));
    }

    #[test]
    fn empty_input_keeps_surface() {
        let mut orch = orchestrator();
        orch.render("graph TD", SourceHint::None, RenderRequest::default()).unwrap();
        let err = orch
            .render(" \n\u{feff}\t", SourceHint::None, RenderRequest::default())
            .unwrap_err();
        assert!(matches!(err, ViewerError::EmptyInput));
        assert_eq!(orch.surface().status().message, "Please provide content to render.");
        assert!(orch.surface().diagram().is_some());
        assert_eq!(orch.state(), RenderState::Idle);
    }

    #[test]
    fn plain_text_is_escaped() {
        let mut orch = orchestrator();
        let outcome = orch
            .render("just <b>text</b>", SourceHint::None, RenderRequest::default())
            .unwrap();
        assert_eq!(outcome.mode, RenderMode::Plain);
        assert_eq!(
            orch.surface().content(),
            "<pre class=\"plain-text\">just &lt;b&gt;text&lt;/b&gt;</pre>"
        );
        assert_eq!(orch.surface().status().message, PLAIN_STATUS);
    }

    #[test]
    fn compile_failure_reports_and_closes_viewer() {
        let mut orch = orchestrator();
        let open = RenderRequest { open_viewer: true };
        orch.render("graph TD\nA-->B", SourceHint::None, open).unwrap();
        assert!(orch.viewer().is_some());

        let err = orch.render("graph TD\nbroken", SourceHint::None, open).unwrap_err();
        assert_eq!(err.to_string(), "Render failed: Parse error on line 2");
        assert!(orch.surface().status().is_error);
        assert!(orch.viewer().is_none());
        assert!(orch.opener().viewer().unwrap().is_closed());
        assert!(orch.history().contains(&RenderState::Error));
        assert_eq!(orch.state(), RenderState::Idle);
    }

    #[test]
    fn reopening_reuses_ready_viewer() {
        let mut orch = orchestrator();
        let open = RenderRequest { open_viewer: true };
        orch.render("graph TD\nA-->B", SourceHint::None, open).unwrap();
        orch.opener_mut().viewer_mut().unwrap().announce_ready().unwrap();
        assert_eq!(orch.poll_viewer().unwrap(), 1);

        let outcome = orch.render("graph LR\nX-->Y", SourceHint::None, open).unwrap();
        assert!(outcome.delivered);
        assert_eq!(orch.viewer().unwrap().state(), ChannelState::Ready);
    }

    #[test]
    fn blocked_viewer_still_renders() {
        let mut orch = orchestrator();
        orch.opener_mut().block();
        let outcome = orch
            .render("graph TD\nA-->B", SourceHint::None, RenderRequest { open_viewer: true })
            .unwrap();
        assert!(outcome.status.message.starts_with(DIAGRAM_STATUS));
        assert!(
            outcome
                .status
                .message
                .ends_with("Popup blocked. Allow popups to open the full viewer.")
        );
        assert!(orch.surface().diagram().is_some());
        assert!(orch.viewer().is_none());
    }

    #[test]
    fn markup_blocks_fail_independently() {
        let mut orch = orchestrator();
        let doc = "# Doc\n\n```mermaid\ngraph TD\nbroken\n```\n\ntext\n\n```mermaid\npie\n```";
        let outcome = orch.render(doc, SourceHint::None, RenderRequest::default()).unwrap();
        assert_eq!(outcome.mode, RenderMode::Markup);
        assert_eq!((outcome.diagrams, outcome.failed), (2, 1));
        assert_eq!(outcome.status.message, "Rendered document; 1 of 2 diagram(s) failed.");
        let content = orch.surface().content();
        assert!(content.starts_with("<h1>Doc</h1>"));
        assert!(content.contains(
            "<div class=\"mermaid-error\">Render failed: Parse error on line 2</div>"
        ));
        assert!(content.contains("<svg id=\"mermaid-diagram-1-1\""));
    }

    #[test]
    fn markup_success_status() {
        let mut orch = orchestrator();
        let outcome = orch
            .render("Intro\n\n```mermaid\npie\n```", SourceHint::None, RenderRequest::default())
            .unwrap();
        assert_eq!(outcome.status.message, "Rendered document with 1 diagram(s).");
        assert!(!outcome.status.is_error);
    }

    #[test]
    fn load_file_uses_extension_hint() {
        let mut orch = orchestrator();
        let outcome = orch.load_file("notes.md", b"```mermaid\ngraph TD\n```").unwrap();
        assert_eq!(outcome.mode, RenderMode::Markup);
        assert_eq!(orch.text(), "```mermaid\ngraph TD\n```");
    }

    #[test]
    fn unreadable_file_keeps_text() {
        let mut orch = orchestrator();
        orch.set_text("graph TD");
        let err = orch.load_file("bad.mmd", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ViewerError::Read(_)));
        assert!(orch.surface().status().message.starts_with("Failed to read file: "));
        assert_eq!(orch.text(), "graph TD");
    }

    #[test]
    fn samples_render_as_diagrams() {
        let mut orch = orchestrator();
        let outcome = orch.load_sample("gantt").unwrap();
        assert_eq!(outcome.mode, RenderMode::Diagram);
        assert!(matches!(orch.load_sample("nope"), Err(ViewerError::UnknownSample(_))));
    }

    #[test]
    fn viewer_request_ignored_for_documents() {
        let mut orch = orchestrator();
        let open = RenderRequest { open_viewer: true };
        let outcome = orch.render("# Doc\n\n```mermaid\npie\n```", SourceHint::None, open).unwrap();
        assert_eq!(outcome.mode, RenderMode::Markup);
        assert!(orch.viewer().is_none());
        assert!(orch.opener_mut().viewer_mut().is_none());
    }

    struct ReadOnlySink;

    impl SaveSink for ReadOnlySink {
        fn save(&self, _file_name: &str, _bytes: &[u8]) -> Result<PathBuf, ViewerError> {
            Err(ViewerError::Export("disk is read-only".to_string()))
        }
    }

    #[test]
    fn export_write_failure_reports_save_failed() {
        let mut orch = orchestrator();
        orch.render("graph TD", SourceHint::None, RenderRequest::default()).unwrap();
        let config = ExportConfig {
            timeout_ms: 0,
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(config, Box::new(ReadOnlySink));
        assert!(orch.export(&exporter).is_err());
        let status = orch.surface().status();
        assert_eq!(status.message, "Save failed: disk is read-only");
        assert!(status.is_error);
        assert!(orch.surface().diagram().is_some());
    }

    #[test]
    fn export_without_diagram_is_refused() {
        let mut orch = orchestrator();
        orch.render("plain words", SourceHint::None, RenderRequest::default()).unwrap();
        let exporter = Exporter::new(ExportConfig::default(), Box::new(ReadOnlySink));
        let err = orch.export(&exporter).unwrap_err();
        assert_eq!(err.to_string(), "No diagram to export.");
    }

    #[test]
    fn reset_and_resize_reach_pan_zoom() {
        let pan_zoom = RecordingPanZoom::default();
        let calls = pan_zoom.calls.clone();
        let mut orch = Orchestrator::new(
            Config::default(),
            Box::new(fake),
            Box::new(pan_zoom),
            opener(),
        );
        orch.render("graph TD", SourceHint::None, RenderRequest::default()).unwrap();
        calls.borrow_mut().clear();
        orch.reset_view();
        orch.resize();
        assert_eq!(
            calls.borrow().as_slice(),
            ["reset#1", "fit#1", "center#1", "resize#1", "fit#1", "center#1"]
        );
    }
}
