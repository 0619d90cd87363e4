use crate::compiler::{CompileError, DiagramCompiler};
use crate::scan::is_fence_marker;
use log::{debug, warn};

/// Removes blank lines and fence delimiters from both ends of a diagram
/// source, repeating until neither boundary changes. Idempotent.
pub fn clean_boundaries(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut start = 0;
    let mut end = lines.len();
    loop {
        let (prev_start, prev_end) = (start, end);
        while start < end && (lines[start].trim().is_empty() || is_fence_marker(lines[start])) {
            start += 1;
        }
        while end > start && (lines[end - 1].trim().is_empty() || is_fence_marker(lines[end - 1])) {
            end -= 1;
        }
        if (start, end) == (prev_start, prev_end) {
            break;
        }
    }
    lines[start..end].join("\n").trim().to_string()
}

/// Compiles `source` once; on failure applies [`label_safety`] and retries
/// exactly once. The second failure is returned as-is.
pub fn compile_with_repair(
    compiler: &dyn DiagramCompiler,
    id: &str,
    source: &str,
) -> Result<String, CompileError> {
    let cleaned = clean_boundaries(source);
    let first = match compiler.compile(id, &cleaned) {
        Ok(svg) => return Ok(svg),
        Err(err) => err,
    };

    let repaired = label_safety(&cleaned);
    if repaired == cleaned {
        debug!("{id}: no unsafe labels to repair after failure: {first}");
        return Err(first);
    }

    debug!("{id}: retrying with quoted labels after failure: {first}");
    compiler.compile(id, &repaired).inspect_err(|err| {
        warn!("{id}: render still failing after label repair: {err}");
    })
}

/// Best-effort label quoting: brackets inside quoted labels become Mermaid
/// entity codes, and unquoted `[..]`, `(..)`, `{..}` node labels or `|..|`
/// edge labels get wrapped in quotes unless they contain brackets.
pub fn label_safety(source: &str) -> String {
    source
        .lines()
        .map(repair_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn repair_line(line: &str) -> String {
    let trimmed = line.trim_start();
    if trimmed.starts_with("%%") {
        return line.to_string();
    }

    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len() + 8);
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        match ch {
            '"' => {
                let Some(close) = find_char(&chars, idx + 1, '"') else {
                    out.extend(&chars[idx..]);
                    break;
                };
                out.push('"');
                out.push_str(&escape_brackets(&chars[idx + 1..close]));
                out.push('"');
                idx = close + 1;
            }
            '[' | '(' | '{' if idx > 0 && is_id_char(chars[idx - 1]) => {
                let Some(close) = find_closing(&chars, idx) else {
                    out.extend(&chars[idx..]);
                    break;
                };
                out.push(ch);
                out.push_str(&quote_label(&chars[idx + 1..close]));
                out.push(chars[close]);
                idx = close + 1;
            }
            '|' if is_edge_pipe(&chars, idx) => {
                let Some(close) = find_char(&chars, idx + 1, '|') else {
                    out.extend(&chars[idx..]);
                    break;
                };
                out.push('|');
                out.push_str(&quote_label(&chars[idx + 1..close]));
                out.push('|');
                idx = close + 1;
            }
            _ => {
                out.push(ch);
                idx += 1;
            }
        }
    }
    out
}

fn quote_label(label: &[char]) -> String {
    let text: String = label.iter().collect();
    let inner = text.trim();
    if inner.is_empty() {
        return text;
    }
    if inner.len() >= 2 && inner.starts_with('"') && inner.ends_with('"') {
        let body: Vec<char> = inner[1..inner.len() - 1].chars().collect();
        return format!("\"{}\"", escape_brackets(&body));
    }
    if inner.contains('"') || label.iter().any(|&ch| is_bracket(ch)) {
        return text;
    }
    format!("\"{inner}\"")
}

fn escape_brackets(text: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for &ch in text {
        match ch {
            '[' => out.push_str("#91;"),
            ']' => out.push_str("#93;"),
            '(' => out.push_str("#40;"),
            ')' => out.push_str("#41;"),
            '{' => out.push_str("#123;"),
            '}' => out.push_str("#125;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_bracket(ch: char) -> bool {
    matches!(ch, '[' | ']' | '(' | ')' | '{' | '}')
}

fn is_id_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// A pipe opens an edge label when the nearest non-space character before it
/// belongs to an arrow.
fn is_edge_pipe(chars: &[char], idx: usize) -> bool {
    chars[..idx]
        .iter()
        .rev()
        .find(|ch| !ch.is_whitespace())
        .is_some_and(|&ch| matches!(ch, '-' | '=' | '.' | '>'))
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    (from..chars.len()).find(|&idx| chars[idx] == target)
}

/// Index of the bracket closing the one at `open`, skipping quoted text.
fn find_closing(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (idx, &ch) in chars.iter().enumerate().skip(open) {
        match ch {
            '"' => in_quote = !in_quote,
            '[' | '(' | '{' if !in_quote => depth += 1,
            ']' | ')' | '}' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_boundaries_strips_fences_and_blank_lines() {
        let raw = "\n\n```mermaid\n\nflowchart TD\n  A --> B\n\n```\n```\n\n";
        assert_eq!(clean_boundaries(raw), "flowchart TD\n  A --> B");
    }

    #[test]
    fn clean_boundaries_is_idempotent() {
        let inputs = [
            "```\n```mermaid\n  graph LR\n  A-->B\n```\n   \n```",
            "   \n\t\n",
            "graph TD\nA-->B",
            "~~~\n\n  sequenceDiagram\n  A->>B: hi  \n~~~",
        ];
        for input in inputs {
            let once = clean_boundaries(input);
            assert_eq!(clean_boundaries(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn quotes_pipe_labels() {
        let repaired = label_safety("flowchart TD\nA -->|price: $5| B");
        assert_eq!(repaired, "flowchart TD\nA -->|\"price: $5\"| B");
    }

    #[test]
    fn quotes_node_labels_without_brackets() {
        assert_eq!(
            label_safety("B{Valid input?} --> C[Render (fast)]"),
            "B{\"Valid input?\"} --> C[Render (fast)]"
        );
        assert_eq!(label_safety("A([Start]) --> B"), "A([Start]) --> B");
    }

    #[test]
    fn escapes_brackets_in_quoted_labels() {
        assert_eq!(
            label_safety("A[\"list[0] (first)\"] --> B"),
            "A[\"list#91;0#93; #40;first#41;\"] --> B"
        );
    }

    #[test]
    fn leaves_safe_sources_alone() {
        let source = "sequenceDiagram\n  A->>B: call [x]\n%%{init: {\"theme\": \"dark\"}}%%";
        assert_eq!(label_safety(source), source);
    }

    fn picky_compiler(id: &str, source: &str) -> Result<String, CompileError> {
        if source.contains("|price") {
            Err(CompileError::new("Parse error on line 2: unexpected '$'"))
        } else {
            Ok(format!("<svg id=\"{id}\"></svg>"))
        }
    }

    #[test]
    fn repair_retry_recovers_unquoted_edge_label() {
        let svg = compile_with_repair(&picky_compiler, "d", "flowchart TD\nA -->|price: $5| B")
            .expect("retry should succeed");
        assert_eq!(svg, "<svg id=\"d\"></svg>");
    }

    #[test]
    fn second_failure_is_surfaced_without_more_retries() {
        let calls = std::cell::Cell::new(0);
        let compiler = |_: &str, _: &str| -> Result<String, CompileError> {
            calls.set(calls.get() + 1);
            Err(CompileError::new(format!("attempt {}", calls.get())))
        };
        let err = compile_with_repair(&compiler, "d", "graph TD\nA[x y] --> B").unwrap_err();
        assert_eq!(err.message, "attempt 2");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unchanged_source_is_not_retried() {
        let calls = std::cell::Cell::new(0);
        let compiler = |_: &str, _: &str| -> Result<String, CompileError> {
            calls.set(calls.get() + 1);
            Err(CompileError::new("bad"))
        };
        let err = compile_with_repair(&compiler, "d", "graph TD\nA --> B").unwrap_err();
        assert_eq!(err.message, "bad");
        assert_eq!(calls.get(), 1);
    }
}
