//! Standalone HTML documents around a mounted fragment.

use crate::config::PanZoomOptions;
use crate::error::ViewerError;
use crate::markup::escape_html;
use crate::surface::Status;

const PAN_ZOOM_SCRIPT: &str =
    "https://cdn.jsdelivr.net/npm/svg-pan-zoom@3.6.1/dist/svg-pan-zoom.min.js";

const STYLE: &str = "\
body{margin:0;font-family:Inter,system-ui,sans-serif;background:#0b1020;color:#e5e7eb}
#status{padding:8px 12px;font-size:13px;color:#9ca3af}
#status.error{color:#f87171}
#diagram{position:absolute;top:36px;left:0;right:0;bottom:0;overflow:auto;padding:12px;box-sizing:border-box}
#diagram>svg{width:100%;height:100%}
.mermaid-error{color:#f87171;font-family:monospace}
pre.plain-text{white-space:pre-wrap}";

// Attaches pan/zoom to a whole-surface diagram only; documents scroll.
const BOOT: &str = "\
(function(){
  var host=document.getElementById('diagram');
  var svg=host.querySelector(':scope > svg');
  if(!svg||!window.svgPanZoom)return;
  var opts=JSON.parse(host.dataset.panZoom);
  var inst=svgPanZoom(svg,opts);
  window.addEventListener('resize',function(){inst.resize();inst.fit();inst.center();});
})();";

/// Wraps `fragment` into a viewable page. Pan/zoom options travel as JSON in
/// the `data-pan-zoom` attribute of the diagram container.
pub fn render_page(
    fragment: &str,
    status: &Status,
    options: &PanZoomOptions,
) -> Result<String, ViewerError> {
    build("Mermaid Viewer", fragment, status, options)
}

/// The detached full-viewport variant.
pub fn render_viewer_page(
    svg: &str,
    status: &Status,
    options: &PanZoomOptions,
) -> Result<String, ViewerError> {
    build("Mermaid Viewer (full view)", svg, status, options)
}

fn build(
    title: &str,
    fragment: &str,
    status: &Status,
    options: &PanZoomOptions,
) -> Result<String, ViewerError> {
    let options = serde_json::to_string(options)?;
    let class = if status.is_error { " class=\"error\"" } else { "" };
    Ok(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n<title>{title}</title>\n<style>\n{STYLE}\n</style>\n<script src=\"{PAN_ZOOM_SCRIPT}\"></script>\n</head>\n<body>\n<div id=\"status\"{class}>{status}</div>\n<div id=\"diagram\" data-pan-zoom=\"{options}\">\n{fragment}\n</div>\n<script>\n{BOOT}\n</script>\n</body>\n</html>\n",
        title = escape_html(title),
        status = escape_html(&status.message),
        options = escape_html(&options),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_embeds_fragment_and_options() {
        let status = Status {
            message: "Rendered <ok>".to_string(),
            is_error: false,
        };
        let html = render_page("<svg></svg>", &status, &PanZoomOptions::default()).unwrap();
        assert!(html.contains("<div id=\"status\">Rendered &lt;ok&gt;</div>"));
        assert!(html.contains("\n<svg></svg>\n"));
        assert!(html.contains("data-pan-zoom=\"{&quot;controlIconsEnabled&quot;:true"));
        assert!(html.contains("&quot;minZoom&quot;:0.4"));
    }

    #[test]
    fn error_status_is_flagged() {
        let status = Status {
            message: "Render failed: x".to_string(),
            is_error: true,
        };
        let html = render_viewer_page("", &status, &PanZoomOptions::default()).unwrap();
        assert!(html.contains("<div id=\"status\" class=\"error\">"));
        assert!(html.contains("(full view)"));
    }
}
