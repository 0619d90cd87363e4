//! Line classification shared by the content classifier and the markup compiler.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(#{1,6})\s+(.*?)\s*$").unwrap());
static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*>\s?(.*)$").unwrap());
static UNORDERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.*)$").unwrap());
static ORDERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,9}[.)]\s+(.*)$").unwrap());

/// Keywords that open a Mermaid diagram description.
pub const DIAGRAM_STARTERS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "gitGraph",
    "quadrantChart",
    "requirementDiagram",
    "C4Context",
    "C4Container",
    "C4Component",
    "C4Dynamic",
    "C4Deployment",
    "sankey-beta",
    "xychart-beta",
    "block-beta",
    "packet-beta",
    "architecture-beta",
    "kanban",
    "radar-beta",
    "treemap-beta",
    "zenuml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Fence {
        marker: char,
        len: usize,
        info: &'a str,
    },
    Heading {
        level: usize,
        text: &'a str,
    },
    Rule,
    Quote {
        text: &'a str,
    },
    ListItem {
        ordered: bool,
        text: &'a str,
    },
    Text,
}

impl LineKind<'_> {
    /// True for every kind that starts a block other than a paragraph.
    pub fn is_block_start(&self) -> bool {
        !matches!(self, LineKind::Blank | LineKind::Text)
    }
}

/// Classifies one line. Checks run in priority order: blank, fence, heading,
/// horizontal rule, block quote, list item, then plain text.
pub fn classify_line(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if let Some(fence) = fence_open(line) {
        return fence;
    }
    if let Some(caps) = HEADING_RE.captures(line) {
        let level = caps.get(1).map_or(1, |m| m.as_str().len());
        let text = caps.get(2).map_or("", |m| m.as_str());
        return LineKind::Heading {
            level,
            text: strip_closing_hashes(text),
        };
    }
    if is_rule(line) {
        return LineKind::Rule;
    }
    if let Some(caps) = QUOTE_RE.captures(line) {
        return LineKind::Quote {
            text: caps.get(1).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = UNORDERED_RE.captures(line) {
        return LineKind::ListItem {
            ordered: false,
            text: caps.get(1).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = ORDERED_RE.captures(line) {
        return LineKind::ListItem {
            ordered: true,
            text: caps.get(1).map_or("", |m| m.as_str()),
        };
    }
    LineKind::Text
}

/// Drops a closing `#` run. It only counts as closing when it stands alone
/// after whitespace, so `C#` keeps its hash.
fn strip_closing_hashes(text: &str) -> &str {
    let body = text.trim_end_matches('#');
    if body.is_empty() {
        return body;
    }
    if body.len() < text.len() && body.ends_with(char::is_whitespace) {
        return body.trim_end();
    }
    text
}

fn fence_open(line: &str) -> Option<LineKind<'_>> {
    let trimmed = line.trim();
    let marker = trimmed.chars().next()?;
    if !matches!(marker, '`' | '~' | ':') {
        return None;
    }
    let len = trimmed.chars().take_while(|&ch| ch == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    // `:::` blocks only count as fences when they wrap a diagram.
    if marker == ':' && !is_diagram_fence(info) {
        return None;
    }
    Some(LineKind::Fence { marker, len, info })
}

/// True when `line` closes a fence opened with `len` repetitions of `marker`.
pub fn is_fence_close(line: &str, marker: char, len: usize) -> bool {
    let trimmed = line.trim();
    let count = trimmed.chars().take_while(|&ch| ch == marker).count();
    count >= len && count == trimmed.chars().count()
}

/// True when the line is any fence delimiter, opening or closing.
pub fn is_fence_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~") || trimmed.starts_with(":::")
}

/// A fence info string marks diagram syntax when its first word is `mermaid`.
pub fn is_diagram_fence(info: &str) -> bool {
    info.split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('{').trim_end_matches('}'))
        .is_some_and(|word| word.eq_ignore_ascii_case("mermaid"))
}

fn is_rule(line: &str) -> bool {
    let mut marks = line.chars().filter(|ch| !ch.is_whitespace());
    let Some(first) = marks.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1;
    for ch in marks {
        if ch != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

/// Returns the matching diagram keyword when the line (after leading
/// whitespace) opens a diagram description. Matching is case-insensitive.
pub fn diagram_starter(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|ch: char| ch.is_whitespace() || ch == ':' || ch == ';')
        .unwrap_or(trimmed.len());
    let word = &trimmed[..end];
    if word.is_empty() {
        return None;
    }
    DIAGRAM_STARTERS
        .iter()
        .copied()
        .find(|starter| starter.eq_ignore_ascii_case(word))
}

/// Mermaid comment or directive line (`%% ...`, `%%{init: ...}%%`).
pub fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with("%%")
}
