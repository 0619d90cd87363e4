use super::escape_html;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Private-use sentinels carry breaks and code spans through escaping.
const BREAK: char = '\u{e000}';
const CODE: char = '\u{e001}';

static BR_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static CODE_SPAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static CODE_SLOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new("\u{e001}(\\d+)\u{e001}").unwrap());
static BOLD_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static BOLD_UNDERSCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").unwrap());
static ITALIC_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());

fn strip_sentinels(text: &str) -> String {
    text.chars().filter(|&ch| ch != BREAK && ch != CODE).collect()
}

/// Renders bold, italic, inline code and line breaks. Structural characters
/// are escaped before any formatting is substituted.
pub fn render_inline(text: &str) -> String {
    render_lines(&[text], |_| false)
}

/// Renders consecutive lines as one inline run, joined by a hard break after
/// line `idx` when `hard_break(idx)` holds and by a space otherwise.
pub(crate) fn render_lines(lines: &[&str], hard_break: impl Fn(usize) -> bool) -> String {
    let mut joined = String::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            joined.push(if hard_break(idx - 1) { BREAK } else { ' ' });
        }
        joined.push_str(&strip_sentinels(line));
    }
    render_marked(&joined)
}

/// `text` holds no CODE sentinels; BREAK sentinels are trusted breaks.
fn render_marked(text: &str) -> String {
    let mut spans: Vec<String> = Vec::new();
    let text = CODE_SPAN_RE.replace_all(text, |caps: &Captures| {
        spans.push(escape_html(&caps[1]));
        format!("{CODE}{}{CODE}", spans.len() - 1)
    });
    // Only `<br>` outside code spans is a break.
    let text = BR_TAG_RE.replace_all(&text, BREAK.to_string().as_str());

    let escaped = escape_html(&text);
    let bold = BOLD_STAR_RE.replace_all(&escaped, "<strong>$1</strong>");
    let bold = BOLD_UNDERSCORE_RE.replace_all(&bold, "<strong>$1</strong>");
    let italic = ITALIC_STAR_RE.replace_all(&bold, "<em>$1</em>");
    let italic = italic_underscores(&italic);

    let restored = CODE_SLOT_RE.replace_all(&italic, |caps: &Captures| {
        let span = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|idx| spans.get(idx))
            .map_or("", String::as_str);
        format!("<code>{span}</code>")
    });
    restored.replace(BREAK, "<br />")
}

fn is_word(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// `_text_` becomes emphasis when neither underscore touches a word
/// character on its outer side. Pairs are taken left to right and the
/// neighbours are only inspected, never consumed.
fn italic_underscores(text: &str) -> String {
    let marks: Vec<usize> = text.match_indices('_').map(|(idx, _)| idx).collect();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut k = 0;
    while k + 1 < marks.len() {
        let (open, close) = (marks[k], marks[k + 1]);
        let outer_before = text[..open].chars().next_back();
        let outer_after = text[close + 1..].chars().next();
        if close > open + 1
            && !outer_before.is_some_and(is_word)
            && !outer_after.is_some_and(is_word)
        {
            out.push_str(&text[copied..open]);
            out.push_str("<em>");
            out.push_str(&text[open + 1..close]);
            out.push_str("</em>");
            copied = close + 1;
            k += 2;
        } else {
            k += 1;
        }
    }
    out.push_str(&text[copied..]);
    out
}
