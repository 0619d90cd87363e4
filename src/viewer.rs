//! Message channel between the primary surface and a detached viewer.
//!
//! The viewer announces itself with `popup-ready` once initialised; the
//! primary holds at most one pending SVG payload until then, each new payload
//! replacing the previous one.

use crate::error::ViewerError;
use crate::export::{ExportOutcome, Exporter};
use crate::surface::{PanZoom, Surface};
use crate::svg;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    PopupReady,
    RenderSvg { svg: String },
}

/// Identity of a browsing context (window) taking part in messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// A message together with the context that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: ContextId,
    pub message: Message,
}

/// One end of a bidirectional message channel.
pub trait Port {
    /// The context on the other end.
    fn peer(&self) -> ContextId;
    fn post(&mut self, message: &Message) -> Result<(), ViewerError>;
    fn try_recv(&mut self) -> Option<Envelope>;
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}

/// Opens a secondary viewer; `None` means the open was blocked.
pub trait ViewerOpener {
    fn open(&mut self) -> Option<Box<dyn Port>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    NotReady,
    Ready,
}

/// Primary side of the viewer handshake.
pub struct ViewerChannel {
    port: Box<dyn Port>,
    state: ChannelState,
    pending: Option<String>,
}

impl ViewerChannel {
    pub fn new(port: Box<dyn Port>) -> Self {
        Self {
            port,
            state: ChannelState::NotReady,
            pending: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.port.is_closed()
    }

    /// Delivers `svg` now if the viewer is ready, otherwise keeps it as the
    /// only pending payload. Returns whether it was delivered.
    pub fn send(&mut self, svg: String) -> Result<bool, ViewerError> {
        if self.port.is_closed() {
            return Err(ViewerError::ChannelClosed);
        }
        self.pending = Some(svg);
        if self.state == ChannelState::NotReady {
            debug!("viewer not ready; holding payload");
            return Ok(false);
        }
        self.flush()
    }

    /// Marks the viewer ready and delivers any pending payload.
    pub fn on_ready(&mut self) -> Result<bool, ViewerError> {
        self.state = ChannelState::Ready;
        self.flush()
    }

    /// Handles an incoming message, ignoring anything not sent by the viewer
    /// this channel opened.
    pub fn on_message(&mut self, envelope: &Envelope) -> Result<bool, ViewerError> {
        if envelope.source != self.port.peer() {
            warn!("ignoring message from unknown context {:?}", envelope.source);
            return Ok(false);
        }
        match envelope.message {
            Message::PopupReady => self.on_ready(),
            Message::RenderSvg { .. } => {
                debug!("primary ignores render-svg messages");
                Ok(false)
            }
        }
    }

    /// Drains queued messages from the port. Returns how many payloads were
    /// delivered as a result.
    pub fn pump(&mut self) -> Result<usize, ViewerError> {
        let mut delivered = 0;
        while let Some(envelope) = self.port.try_recv() {
            if self.on_message(&envelope)? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn close(&mut self) {
        self.pending = None;
        self.port.close();
    }

    fn flush(&mut self) -> Result<bool, ViewerError> {
        let Some(svg) = self.pending.take() else {
            return Ok(false);
        };
        self.port.post(&Message::RenderSvg { svg })?;
        Ok(true)
    }
}

/// The detached, full-viewport viewer.
pub struct SecondaryViewer {
    port: Box<dyn Port>,
    surface: Surface,
}

impl SecondaryViewer {
    pub fn new(port: Box<dyn Port>, pan_zoom: Box<dyn PanZoom>) -> Self {
        Self {
            port,
            surface: Surface::new(pan_zoom),
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn is_closed(&self) -> bool {
        self.port.is_closed()
    }

    /// Tells the opener this viewer finished initialising.
    pub fn announce_ready(&mut self) -> Result<(), ViewerError> {
        if self.port.is_closed() {
            return Err(ViewerError::ChannelClosed);
        }
        self.port.post(&Message::PopupReady)
    }

    /// Handles queued messages; returns how many were rendered.
    pub fn pump(&mut self) -> usize {
        let mut rendered = 0;
        while let Some(envelope) = self.port.try_recv() {
            if let Message::RenderSvg { svg } = envelope.message {
                self.render_svg(&svg);
                rendered += 1;
            }
        }
        rendered
    }

    /// Replaces the displayed content with `markup`, normalised to fill the
    /// viewport, and reattaches the pan/zoom layer.
    pub fn render_svg(&mut self, markup: &str) {
        if !markup.contains("<svg") {
            self.surface.mount(markup);
            self.surface.set_status("No SVG found to render.", true);
            return;
        }
        self.surface.mount_diagram(&svg::normalize_for_viewport(markup));
        self.surface.set_status("Scroll to zoom, drag to pan", false);
    }

    pub fn resize(&mut self) {
        self.surface.resize();
    }

    /// Exports the displayed SVG as PNG, falling back to SVG.
    pub fn save(&mut self, exporter: &Exporter) -> Result<ExportOutcome, ViewerError> {
        let Some(svg) = self.surface.diagram().map(str::to_string) else {
            self.surface.set_status("No SVG to save.", true);
            return Err(ViewerError::Export("No SVG to save.".to_string()));
        };
        self.surface.set_status("Preparing PNG...", false);
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

    pub fn close(&mut self) {
        self.port.close();
    }
}

#[derive(Debug, Default)]
struct Link {
    to_secondary: VecDeque<String>,
    to_primary: VecDeque<String>,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Primary,
    Secondary,
}

/// In-process port; messages travel as JSON, as they would between windows.
#[derive(Debug)]
pub struct LocalPort {
    link: Rc<RefCell<Link>>,
    side: Side,
    own: ContextId,
    peer: ContextId,
}

/// Connected ports for a primary and a secondary context.
pub fn local_pair(primary: ContextId, secondary: ContextId) -> (LocalPort, LocalPort) {
    let link = Rc::new(RefCell::new(Link::default()));
    (
        LocalPort {
            link: Rc::clone(&link),
            side: Side::Primary,
            own: primary,
            peer: secondary,
        },
        LocalPort {
            link,
            side: Side::Secondary,
            own: secondary,
            peer: primary,
        },
    )
}

impl LocalPort {
    /// Context this port belongs to.
    pub fn own(&self) -> ContextId {
        self.own
    }
}

impl Port for LocalPort {
    fn peer(&self) -> ContextId {
        self.peer
    }

    fn post(&mut self, message: &Message) -> Result<(), ViewerError> {
        let mut link = self.link.borrow_mut();
        if link.closed {
            return Err(ViewerError::ChannelClosed);
        }
        let payload = serde_json::to_string(message)?;
        match self.side {
            Side::Primary => link.to_secondary.push_back(payload),
            Side::Secondary => link.to_primary.push_back(payload),
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Envelope> {
        let mut link = self.link.borrow_mut();
        loop {
            let raw = match self.side {
                Side::Primary => link.to_primary.pop_front(),
                Side::Secondary => link.to_secondary.pop_front(),
            }?;
            match serde_json::from_str(&raw) {
                Ok(message) => {
                    return Some(Envelope {
                        source: self.peer,
                        message,
                    });
                }
                Err(err) => warn!("dropping malformed message: {err}"),
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.link.borrow().closed
    }

    fn close(&mut self) {
        let mut link = self.link.borrow_mut();
        link.closed = true;
        link.to_primary.clear();
        link.to_secondary.clear();
    }
}

/// Opens in-process viewers. Used by the CLI to produce the detached view.
pub struct LocalViewerOpener {
    primary: ContextId,
    next_id: u64,
    blocked: bool,
    make_pan_zoom: Box<dyn Fn() -> Box<dyn PanZoom>>,
    viewer: Option<SecondaryViewer>,
}

impl LocalViewerOpener {
    pub fn new(make_pan_zoom: Box<dyn Fn() -> Box<dyn PanZoom>>) -> Self {
        Self {
            primary: ContextId(0),
            next_id: 1,
            blocked: false,
            make_pan_zoom,
            viewer: None,
        }
    }

    /// Makes every subsequent open fail, as a popup blocker would.
    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn viewer(&self) -> Option<&SecondaryViewer> {
        self.viewer.as_ref()
    }

    pub fn viewer_mut(&mut self) -> Option<&mut SecondaryViewer> {
        self.viewer.as_mut()
    }
}

impl ViewerOpener for LocalViewerOpener {
    fn open(&mut self) -> Option<Box<dyn Port>> {
        if self.blocked {
            return None;
        }
        let secondary = ContextId(self.next_id);
        self.next_id += 1;
        let (primary_port, secondary_port) = local_pair(self.primary, secondary);
        self.viewer = Some(SecondaryViewer::new(
            Box::new(secondary_port),
            (self.make_pan_zoom)(),
        ));
        Some(Box::new(primary_port))
    }
}
