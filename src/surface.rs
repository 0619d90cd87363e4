use crate::markup::placeholder;
use log::{debug, trace};
use serde::Serialize;

/// One human-readable status line, overwritten on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

/// Pan/zoom interaction layer attached to a mounted SVG.
pub trait PanZoom {
    fn attach(&self, svg: &str) -> Box<dyn PanZoomHandle>;
}

pub trait PanZoomHandle {
    fn fit(&mut self);
    fn center(&mut self);
    fn resize(&mut self);
    fn reset(&mut self);
    fn destroy(&mut self);
}

/// Interaction layer for headless use: the browser page wires the real one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPanZoom;

impl PanZoom for NoopPanZoom {
    fn attach(&self, svg: &str) -> Box<dyn PanZoomHandle> {
        trace!("pan/zoom attached to {} bytes of svg", svg.len());
        Box::new(NoopHandle)
    }
}

struct NoopHandle;

impl PanZoomHandle for NoopHandle {
    fn fit(&mut self) {}
    fn center(&mut self) {}
    fn resize(&mut self) {}
    fn reset(&mut self) {}
    fn destroy(&mut self) {
        trace!("pan/zoom destroyed");
    }
}

/// A display area: mounted fragment, status line and the pan/zoom instance
/// it exclusively owns.
pub struct Surface {
    content: String,
    diagram: Option<String>,
    status: Status,
    pan_zoom: Box<dyn PanZoom>,
    handle: Option<Box<dyn PanZoomHandle>>,
}

impl Surface {
    pub fn new(pan_zoom: Box<dyn PanZoom>) -> Self {
        Self {
            content: String::new(),
            diagram: None,
            status: Status::default(),
            pan_zoom,
            handle: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// The SVG currently mounted as a whole-surface diagram, if any.
    pub fn diagram(&self) -> Option<&str> {
        self.diagram.as_deref()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status = Status {
            message: message.into(),
            is_error,
        };
    }

    pub fn has_pan_zoom(&self) -> bool {
        self.handle.is_some()
    }

    /// Destroys the interaction layer and empties the surface.
    pub fn clear(&mut self) {
        self.detach_pan_zoom();
        self.content.clear();
        self.diagram = None;
    }

    pub fn mount(&mut self, fragment: &str) {
        self.clear();
        self.content = fragment.to_string();
    }

    /// Mounts a single SVG and attaches a fresh, fitted pan/zoom instance.
    pub fn mount_diagram(&mut self, svg: &str) {
        self.mount(svg);
        self.diagram = Some(svg.to_string());
        let mut handle = self.pan_zoom.attach(svg);
        handle.resize();
        handle.fit();
        handle.center();
        self.handle = Some(handle);
    }

    pub fn has_placeholder(&self, id: &str) -> bool {
        self.content.contains(&placeholder(id))
    }

    /// Writes `html` into the placeholder for `id`. Returns false when the
    /// placeholder is gone, e.g. because a newer cycle remounted the surface.
    pub fn fill_placeholder(&mut self, id: &str, html: &str) -> bool {
        let target = placeholder(id);
        let Some(pos) = self.content.find(&target) else {
            debug!("mount target {id} no longer exists");
            return false;
        };
        let open = target.trim_end_matches("</div>");
        let filled = format!("{open}{html}</div>");
        self.content.replace_range(pos..pos + target.len(), &filled);
        true
    }

    pub fn reset_view(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.reset();
            handle.fit();
            handle.center();
        }
    }

    pub fn resize(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.resize();
            handle.fit();
            handle.center();
        }
    }

    fn detach_pan_zoom(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.destroy();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPanZoom;
    use super::*;

    #[test]
    fn remount_destroys_previous_pan_zoom_first() {
        let pan_zoom = RecordingPanZoom::default();
        let calls = pan_zoom.calls.clone();
        let mut surface = Surface::new(Box::new(pan_zoom));
        surface.mount_diagram("<svg></svg>");
        surface.mount_diagram("<svg id=\"2\"></svg>");
        assert_eq!(
            calls.borrow().as_slice(),
            [
                "attach", "resize#1", "fit#1", "center#1", "destroy#1", "attach", "resize#2",
                "fit#2", "center#2"
            ]
        );
        assert_eq!(surface.diagram(), Some("<svg id=\"2\"></svg>"));
    }

    #[test]
    fn reset_view_refits() {
        let pan_zoom = RecordingPanZoom::default();
        let calls = pan_zoom.calls.clone();
        let mut surface = Surface::new(Box::new(pan_zoom));
        surface.reset_view();
        assert!(calls.borrow().is_empty());
        surface.mount_diagram("<svg></svg>");
        calls.borrow_mut().clear();
        surface.reset_view();
        assert_eq!(calls.borrow().as_slice(), ["reset#1", "fit#1", "center#1"]);
    }

    #[test]
    fn fills_placeholders_once() {
        let mut surface = Surface::new(Box::new(NoopPanZoom));
        surface.mount(&format!("<h1>x</h1>{}", placeholder("b-0")));
        assert!(surface.has_placeholder("b-0"));
        assert!(surface.fill_placeholder("b-0", "<svg></svg>"));
        assert_eq!(
            surface.content(),
            "<h1>x</h1><div class=\"mermaid-block\" data-block-id=\"b-0\"><svg></svg></div>"
        );
        assert!(!surface.has_placeholder("b-0"));
        assert!(!surface.fill_placeholder("b-0", "<svg>late</svg>"));
    }

    #[test]
    fn stale_placeholder_after_remount_is_dropped() {
        let mut surface = Surface::new(Box::new(NoopPanZoom));
        surface.mount(&placeholder("cycle1-0"));
        surface.mount(&placeholder("cycle2-0"));
        assert!(!surface.fill_placeholder("cycle1-0", "<svg></svg>"));
        assert!(surface.has_placeholder("cycle2-0"));
    }
}
