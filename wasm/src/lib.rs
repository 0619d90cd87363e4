use mermaid_viewer::markup::{DocumentBlock, compile_markup, placeholder, split_blocks};
use mermaid_viewer::{RenderMode, SourceHint, classify, sanitize};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Classified {
    mode: RenderMode,
    diagram_source: Option<String>,
}

#[derive(Debug, Serialize)]
struct PendingDiagram {
    id: String,
    source: String,
}

/// Markup with placeholders, plus the diagrams the page still has to compile.
#[derive(Debug, Serialize)]
struct CompiledDocument {
    html: String,
    diagrams: Vec<PendingDiagram>,
}

fn parse_hint(hint: Option<String>) -> Result<SourceHint, JsValue> {
    match hint.as_deref() {
        None | Some("") => Ok(SourceHint::None),
        Some(raw) => serde_json::from_value(serde_json::Value::String(raw.to_string()))
            .map_err(|error| JsValue::from_str(&error.to_string())),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|error| JsValue::from_str(&error.to_string()))
}

fn classify_text(text: &str, hint: SourceHint) -> Classified {
    let result = classify(&sanitize(text), hint);
    Classified {
        mode: result.mode,
        diagram_source: result.diagram_source,
    }
}

fn compile(text: &str, id_prefix: &str) -> CompiledDocument {
    let mut html = Vec::new();
    let mut diagrams = Vec::new();
    for block in split_blocks(&sanitize(text), id_prefix) {
        match block {
            DocumentBlock::Markup { content } => html.push(compile_markup(&content)),
            DocumentBlock::Diagram { content, id } => {
                html.push(placeholder(&id));
                diagrams.push(PendingDiagram { id, source: content });
            }
        }
    }
    CompiledDocument {
        html: html.join("\n"),
        diagrams,
    }
}

/// Classifies input; `hint` is `"diagram"`, `"markup"` or absent.
#[wasm_bindgen]
pub fn classify_input(text: &str, hint: Option<String>) -> Result<String, JsValue> {
    to_json(&classify_text(text, parse_hint(hint)?))
}

#[wasm_bindgen]
pub fn compile_document(text: &str, id_prefix: &str) -> Result<String, JsValue> {
    to_json(&compile(text, id_prefix))
}
