use super::escape_html;
use super::inline::{render_inline, render_lines};
use crate::scan::{LineKind, classify_line, is_fence_close};

/// Compiles a markup run (no diagram blocks) to HTML.
pub fn compile_markup(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = String::new();
    let mut idx = 0;
    while idx < lines.len() {
        idx = match classify_line(lines[idx]) {
            LineKind::Blank => idx + 1,
            LineKind::Fence { marker, len, info } => {
                code_block(&lines, idx, marker, len, info, &mut out)
            }
            LineKind::Heading { level, text } => {
                out.push_str(&format!("<h{level}>{}</h{level}>\n", render_inline(text)));
                idx + 1
            }
            LineKind::Rule => {
                out.push_str("<hr />\n");
                idx + 1
            }
            LineKind::Quote { .. } => quote_block(&lines, idx, &mut out),
            LineKind::ListItem { ordered, .. } => list_block(&lines, idx, ordered, &mut out),
            LineKind::Text => paragraph(&lines, idx, &mut out),
        };
    }
    out
}

fn code_block(
    lines: &[&str],
    start: usize,
    marker: char,
    len: usize,
    info: &str,
    out: &mut String,
) -> usize {
    let mut idx = start + 1;
    let mut body: Vec<String> = Vec::new();
    while idx < lines.len() && !is_fence_close(lines[idx], marker, len) {
        body.push(escape_html(lines[idx]));
        idx += 1;
    }
    match info.split_whitespace().next() {
        Some(lang) => out.push_str(&format!(
            "<pre><code class=\"language-{}\">",
            escape_html(lang)
        )),
        None => out.push_str("<pre><code>"),
    }
    out.push_str(&body.join("\n"));
    out.push_str("</code></pre>\n");
    // Skip the closing fence when there is one; unterminated fences run to the end.
    (idx + 1).min(lines.len())
}

fn quote_block(lines: &[&str], start: usize, out: &mut String) -> usize {
    let mut idx = start;
    let mut parts = Vec::new();
    while idx < lines.len() {
        match classify_line(lines[idx]) {
            LineKind::Quote { text } => parts.push(text),
            _ => break,
        }
        idx += 1;
    }
    out.push_str(&format!(
        "<blockquote><p>{}</p></blockquote>\n",
        join_lines(&parts)
    ));
    idx
}

fn list_block(lines: &[&str], start: usize, ordered: bool, out: &mut String) -> usize {
    let tag = if ordered { "ol" } else { "ul" };
    let mut idx = start;
    out.push_str(&format!("<{tag}>\n"));
    while idx < lines.len() {
        match classify_line(lines[idx]) {
            LineKind::ListItem {
                ordered: item_ordered,
                text,
            } if item_ordered == ordered => {
                out.push_str(&format!("<li>{}</li>\n", render_inline(text)));
            }
            _ => break,
        }
        idx += 1;
    }
    out.push_str(&format!("</{tag}>\n"));
    idx
}

fn paragraph(lines: &[&str], start: usize, out: &mut String) -> usize {
    let mut idx = start;
    let mut parts = Vec::new();
    while idx < lines.len() && classify_line(lines[idx]) == LineKind::Text {
        parts.push(lines[idx]);
        idx += 1;
    }
    out.push_str(&format!("<p>{}</p>\n", join_lines(&parts)));
    idx
}

/// Joins consecutive lines with a space, or with a hard break when a line
/// ends in exactly two spaces.
fn join_lines(parts: &[&str]) -> String {
    let trimmed: Vec<&str> = parts.iter().map(|part| part.trim()).collect();
    render_lines(&trimmed, |idx| ends_with_hard_break(parts[idx]))
}

fn ends_with_hard_break(line: &str) -> bool {
    let trailing = line.len() - line.trim_end_matches(' ').len();
    trailing == 2
}
