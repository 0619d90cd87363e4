//! Built-in example diagrams.

pub const FLOW: &str = "flowchart TD
  A([Start]) --> B{Valid input?}
  B -- Yes --> C[Render diagram]
  B -- No --> D[Show error]
  C --> E[Zoom & Pan enabled]
  D --> E
  E --> F([Done])";

pub const SEQUENCE: &str = "sequenceDiagram
  participant U as User
  participant V as Viewer
  participant M as Mermaid
  U->>V: Paste definition
  V->>M: mermaid.render(definition)
  M-->>V: Returns SVG
  V-->>U: Pan & zoom hooks applied
  U->>U: Iterate quickly";

pub const GANTT: &str = "gantt
  dateFormat  YYYY-MM-DD
  title Local build example
  section Build
  Setup :done, 2023-01-02, 2d
  Coding :active, 2023-01-04, 4d
  Tests  : 2023-01-08, 3d
  Deploy : 2023-01-12, 1d";

pub const NAMES: [&str; 3] = ["flow", "sequence", "gantt"];

pub fn sample(name: &str) -> Option<&'static str> {
    match name {
        "flow" => Some(FLOW),
        "sequence" => Some(SEQUENCE),
        "gantt" => Some(GANTT),
        _ => None,
    }
}
