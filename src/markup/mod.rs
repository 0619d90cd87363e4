//! Lightweight markup compilation with diagram blocks carved out as
//! placeholders.

mod block;
mod inline;

pub use block::compile_markup;
pub use inline::render_inline;

use crate::normalize::clean_boundaries;
use crate::scan::{LineKind, classify_line, is_diagram_fence, is_fence_close};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentBlock {
    Markup { content: String },
    Diagram { content: String, id: String },
}

impl DocumentBlock {
    pub fn is_diagram(&self) -> bool {
        matches!(self, DocumentBlock::Diagram { .. })
    }
}

pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Empty container a diagram block's SVG is later written into.
pub fn placeholder(id: &str) -> String {
    format!(
        "<div class=\"mermaid-block\" data-block-id=\"{}\"></div>",
        escape_html(id)
    )
}

/// Splits a document into markup runs and fenced diagram regions, in order.
/// Diagram ids are `{id_prefix}-{n}` with `n` counting from zero.
pub fn split_blocks(text: &str, id_prefix: &str) -> Vec<DocumentBlock> {
    let mut blocks = Vec::new();
    let mut markup: Vec<&str> = Vec::new();
    let mut lines = text.lines();
    let mut diagrams = 0;

    while let Some(line) = lines.next() {
        let LineKind::Fence { marker, len, info } = classify_line(line) else {
            markup.push(line);
            continue;
        };

        let mut body = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if is_fence_close(inner, marker, len) {
                closed = true;
                body.push(inner);
                break;
            }
            body.push(inner);
        }

        if !is_diagram_fence(info) {
            // Code fences stay in the markup run so a nested diagram fence is
            // shown as code.
            markup.push(line);
            markup.extend(body);
            continue;
        }

        if closed {
            body.pop();
        }
        flush_markup(&mut markup, &mut blocks);
        blocks.push(DocumentBlock::Diagram {
            content: clean_boundaries(&body.join("\n")),
            id: format!("{id_prefix}-{diagrams}"),
        });
        diagrams += 1;
    }
    flush_markup(&mut markup, &mut blocks);
    blocks
}

fn flush_markup(markup: &mut Vec<&str>, blocks: &mut Vec<DocumentBlock>) {
    if markup.iter().any(|line| !line.trim().is_empty()) {
        blocks.push(DocumentBlock::Markup {
            content: markup.join("\n"),
        });
    }
    markup.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_in_document_order() {
        let doc = "# Notes\n\n```mermaid\ngraph TD\nA-->B\n```\nBetween\n~~~ mermaid\nsequenceDiagram\nA->>B: hi\n~~~\n";
        let blocks = split_blocks(doc, "d");
        assert_eq!(
            blocks,
            vec![
                DocumentBlock::Markup {
                    content: "# Notes\n".to_string()
                },
                DocumentBlock::Diagram {
                    content: "graph TD\nA-->B".to_string(),
                    id: "d-0".to_string()
                },
                DocumentBlock::Markup {
                    content: "Between".to_string()
                },
                DocumentBlock::Diagram {
                    content: "sequenceDiagram\nA->>B: hi".to_string(),
                    id: "d-1".to_string()
                },
            ]
        );
    }

    #[test]
    fn diagram_inside_code_fence_is_not_carved() {
        let doc = "````markdown\n```mermaid\ngraph TD\n```\n````";
        let blocks = split_blocks(doc, "d");
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].is_diagram());
        let html = compile_markup(match &blocks[0] {
            DocumentBlock::Markup { content } => content,
            DocumentBlock::Diagram { .. } => unreachable!(),
        });
        assert!(html.contains("```mermaid"));
    }

    #[test]
    fn unterminated_diagram_fence_runs_to_end() {
        let blocks = split_blocks("intro\n```mermaid\npie\n\"a\": 1", "x");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[1],
            DocumentBlock::Diagram {
                content: "pie\n\"a\": 1".to_string(),
                id: "x-0".to_string()
            }
        );
    }

    #[test]
    fn colon_fences_wrap_diagrams() {
        let blocks = split_blocks("::: mermaid\nflowchart LR\n  X --> Y\n:::", "c");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_diagram());
    }

    #[test]
    fn placeholder_carries_id() {
        assert_eq!(
            placeholder("mermaid-diagram-3-0"),
            "<div class=\"mermaid-block\" data-block-id=\"mermaid-diagram-3-0\"></div>"
        );
    }
}
