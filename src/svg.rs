//! Attribute-level edits on the root `<svg>` element of rendered markup.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

static ROOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b[^>]*>").unwrap());
static STYLE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(<style\b[^>]*>)(.*?)(</style>)").unwrap());
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@import[^;]+;").unwrap());
static IMAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<image\b[^>]*>").unwrap());
static REMOTE_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s(?:xlink:)?href\s*=\s*(?:"\s*https?://[^"]*"|'\s*https?://[^']*')"#).unwrap()
});
static MAX_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)max-width\s*:\s*[^;]+;?").unwrap());

fn root_span(svg: &str) -> Option<Range<usize>> {
    ROOT_RE.find(svg).map(|m| m.range())
}

fn attr_re(name: &str) -> Regex {
    Regex::new(&format!(
        r#"\s{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(name)
    ))
    .unwrap()
}

/// Value of an attribute on the root element.
pub fn root_attr(svg: &str, name: &str) -> Option<String> {
    let span = root_span(svg)?;
    let caps = attr_re(name).captures(&svg[span])?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

pub fn remove_root_attr(svg: &str, name: &str) -> String {
    let Some(span) = root_span(svg) else {
        return svg.to_string();
    };
    let tag = attr_re(name).replace_all(&svg[span.clone()], "");
    format!("{}{}{}", &svg[..span.start], tag, &svg[span.end..])
}

pub fn set_root_attr(svg: &str, name: &str, value: &str) -> String {
    let Some(span) = root_span(svg) else {
        return svg.to_string();
    };
    let tag = &svg[span.clone()];
    let value = escape_attr(value);
    let re = attr_re(name);
    let new_tag = if re.is_match(tag) {
        re.replace(tag, |_: &Captures| format!(" {name}=\"{value}\""))
            .into_owned()
    } else {
        let insert_at = if tag.ends_with("/>") {
            tag.len() - 2
        } else {
            tag.len() - 1
        };
        format!("{} {name}=\"{value}\"{}", &tag[..insert_at], &tag[insert_at..])
    };
    format!("{}{}{}", &svg[..span.start], new_tag, &svg[span.end..])
}

/// Drops explicit `width`/`height` so the surrounding layer controls sizing.
pub fn strip_size(svg: &str) -> String {
    remove_root_attr(&remove_root_attr(svg, "width"), "height")
}

/// Parsed `viewBox` as `(min_x, min_y, width, height)`.
pub fn view_box(svg: &str) -> Option<(f32, f32, f32, f32)> {
    let raw = root_attr(svg, "viewBox")?;
    let values: Vec<f32> = raw
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [x, y, w, h] => Some((*x, *y, *w, *h)),
        _ => None,
    }
}

fn length(value: &str) -> Option<f32> {
    let number = value.trim().trim_end_matches("px");
    number.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// Adds a `viewBox` derived from numeric width/height when none exists.
pub fn ensure_view_box(svg: &str) -> String {
    if root_attr(svg, "viewBox").is_some() {
        return svg.to_string();
    }
    let width = root_attr(svg, "width").as_deref().and_then(length);
    let height = root_attr(svg, "height").as_deref().and_then(length);
    match (width, height) {
        (Some(w), Some(h)) => set_root_attr(svg, "viewBox", &format!("0 0 {w} {h}")),
        _ => svg.to_string(),
    }
}

/// Prepares markup for a full-viewport display: coordinate box present,
/// size constraints replaced by fill-parent styling.
pub fn normalize_for_viewport(svg: &str) -> String {
    let svg = ensure_view_box(svg);
    let style = root_attr(&svg, "style").unwrap_or_default();
    let mut style = MAX_WIDTH_RE.replace_all(&style, "").trim().to_string();
    if !style.is_empty() && !style.ends_with(';') {
        style.push(';');
    }
    style.push_str("max-width:none;width:100%;height:100%;");
    let svg = set_root_attr(&strip_size(&svg), "style", &style);
    set_root_attr(&svg, "preserveAspectRatio", "xMidYMid meet")
}

/// Removes `@import` rules from style blocks and remote references from
/// embedded images so rasterisation never reaches the network.
pub fn strip_external_resources(svg: &str) -> String {
    let svg = STYLE_BLOCK_RE.replace_all(svg, |caps: &Captures| {
        format!("{}{}{}", &caps[1], IMPORT_RE.replace_all(&caps[2], ""), &caps[3])
    });
    IMAGE_RE
        .replace_all(&svg, |caps: &Captures| {
            REMOTE_HREF_RE.replace_all(&caps[0], "").into_owned()
        })
        .into_owned()
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
