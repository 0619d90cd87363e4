//! Decides whether input is a diagram, a markup document or plain text.

use crate::normalize::clean_boundaries;
use crate::scan::{
    LineKind, classify_line, diagram_starter, is_diagram_fence, is_directive, is_fence_close,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Diagram,
    Markup,
    Plain,
}

/// Declared content type of the input, when one is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHint {
    Diagram,
    Markup,
    #[default]
    None,
}

impl SourceHint {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mmd" | "mermaid" => SourceHint::Diagram,
            "md" | "markdown" | "mdown" | "mkd" => SourceHint::Markup,
            _ => SourceHint::None,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub mode: RenderMode,
    pub diagram_source: Option<String>,
}

/// What one pass over the lines found.
#[derive(Debug, Default)]
struct Survey {
    fenced: Vec<String>,
    content_outside_fences: bool,
    starter_line: Option<usize>,
    has_structure: bool,
}

fn survey(lines: &[&str]) -> Survey {
    let mut survey = Survey::default();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        match classify_line(line) {
            LineKind::Blank => {}
            LineKind::Fence { marker, len, info } => {
                survey.has_structure = true;
                let body_start = idx + 1;
                let mut end = body_start;
                while end < lines.len() && !is_fence_close(lines[end], marker, len) {
                    end += 1;
                }
                if is_diagram_fence(info) {
                    survey.fenced.push(clean_boundaries(&lines[body_start..end].join("\n")));
                } else {
                    survey.content_outside_fences = true;
                }
                idx = end + 1;
                continue;
            }
            kind => {
                survey.content_outside_fences = true;
                survey.has_structure |= kind.is_block_start();
                if survey.starter_line.is_none() && diagram_starter(line).is_some() {
                    survey.starter_line = Some(idx);
                }
            }
        }
        idx += 1;
    }
    survey
}

/// Source of a diagram that opens the (boundary-cleaned) text, allowing
/// leading front matter and `%%` directives, with no fence or heading
/// anywhere after the keyword line.
fn leading_diagram(text: &str) -> Option<String> {
    let cleaned = clean_boundaries(text);
    let lines: Vec<&str> = cleaned.lines().collect();
    let mut idx = front_matter_end(&lines);
    while idx < lines.len() && is_directive(lines[idx]) {
        idx += 1;
    }
    diagram_starter(lines.get(idx)?)?;
    let embedded_structure = lines[idx + 1..].iter().any(|line| {
        matches!(
            classify_line(line),
            LineKind::Fence { .. } | LineKind::Heading { .. }
        )
    });
    (!embedded_structure).then_some(cleaned)
}

fn front_matter_end(lines: &[&str]) -> usize {
    if lines.first().map(|line| line.trim()) != Some("---") {
        return 0;
    }
    lines
        .iter()
        .skip(1)
        .position(|line| line.trim() == "---")
        .map_or(0, |pos| pos + 2)
}

/// Classifies sanitized, non-empty input. A diagram hint forces diagram mode
/// and a markup hint forces markup mode; otherwise only a pure diagram (one
/// fenced block and nothing else, or a starter keyword opening the text)
/// yields diagram mode.
pub fn classify(text: &str, hint: SourceHint) -> Classification {
    let lines: Vec<&str> = text.lines().collect();
    let survey = survey(&lines);

    let (candidate, pure) = if survey.fenced.len() == 1 && !survey.content_outside_fences {
        (survey.fenced.first().cloned(), true)
    } else if let Some(source) = survey.fenced.is_empty().then(|| leading_diagram(text)).flatten() {
        (Some(source), true)
    } else if let Some(first) = survey.fenced.first() {
        (Some(first.clone()), false)
    } else {
        let suffix = survey
            .starter_line
            .map(|idx| clean_boundaries(&lines[idx..].join("\n")));
        (suffix, false)
    };

    let mode = match (&candidate, hint) {
        (Some(_), SourceHint::Diagram) => RenderMode::Diagram,
        (Some(_), SourceHint::Markup) => RenderMode::Markup,
        (Some(_), SourceHint::None) if pure => RenderMode::Diagram,
        (Some(_), SourceHint::None) => RenderMode::Markup,
        (None, SourceHint::Diagram) => RenderMode::Diagram,
        (None, SourceHint::Markup) => RenderMode::Markup,
        (None, SourceHint::None) if survey.has_structure => RenderMode::Markup,
        (None, SourceHint::None) => RenderMode::Plain,
    };

    // A forced diagram without a recognised starter is handed to the compiler whole.
    let diagram_source = match (mode, candidate) {
        (RenderMode::Diagram, None) => Some(clean_boundaries(text)),
        (_, candidate) => candidate,
    };

    Classification {
        mode,
        diagram_source,
    }
}
