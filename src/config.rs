use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Renderer executable that reads a diagram on stdin and prints SVG.
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "mmdr".to_string(),
            args: vec!["-e".to_string(), "svg".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub background: String,
    pub timeout_ms: u64,
    pub default_width: f32,
    pub default_height: f32,
    pub font_family: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            background: "#0b1020".to_string(),
            timeout_ms: 5000,
            default_width: 1600.0,
            default_height: 900.0,
            font_family: "Inter".to_string(),
        }
    }
}

/// Options handed to the browser-side pan/zoom layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PanZoomOptions {
    pub control_icons_enabled: bool,
    pub zoom_enabled: bool,
    pub pan_enabled: bool,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_scale_sensitivity: f32,
    pub fit: bool,
    pub center: bool,
}

impl Default for PanZoomOptions {
    fn default() -> Self {
        Self {
            control_icons_enabled: true,
            zoom_enabled: true,
            pan_enabled: true,
            min_zoom: 0.4,
            max_zoom: 12.0,
            zoom_scale_sensitivity: 0.6,
            fit: true,
            center: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compiler: CompilerConfig,
    pub export: ExportConfig,
    pub pan_zoom: PanZoomOptions,
}

/// Loads a JSON (JSON5 accepted) config file; missing sections keep defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let contents = std::fs::read_to_string(path)?;
    let config: Config = json5::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("invalid config {}: {err}", path.display()))?;
    if config.export.timeout_ms == 0 {
        anyhow::bail!("export.timeout_ms must be greater than zero");
    }
    Ok(config)
}
