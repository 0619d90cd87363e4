use crate::config::ExportConfig;
use crate::error::ViewerError;
use crate::svg;
use log::{info, warn};
#[cfg(feature = "png")]
use once_cell::sync::Lazy;
use serde::Serialize;
use std::path::{Path, PathBuf};
#[cfg(feature = "png")]
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Svg,
}

impl ExportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Png => "diagram.png",
            ExportFormat::Svg => "diagram.svg",
        }
    }
}

/// How the exported file reached storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveRoute {
    Picker,
    Download,
    /// The picker failed after rasterisation succeeded.
    DownloadFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub via: SaveRoute,
    /// Why rasterisation failed, when the SVG fallback was stored.
    pub fallback_reason: Option<String>,
}

impl ExportOutcome {
    pub fn describe(&self) -> String {
        match (self.format, self.via) {
            (ExportFormat::Png, SaveRoute::DownloadFallback) => "Saved PNG (fallback).".to_string(),
            (ExportFormat::Png, _) => "Saved PNG.".to_string(),
            (ExportFormat::Svg, _) => self
                .fallback_reason
                .clone()
                .unwrap_or_else(|| "Saved SVG.".to_string()),
        }
    }

    /// True when the PNG could not be produced.
    pub fn is_fallback(&self) -> bool {
        self.format == ExportFormat::Svg
    }
}

/// Somewhere exported bytes can be written.
pub trait SaveSink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ViewerError>;
}

/// Writes files under a directory using the suggested name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveSink for DirectorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ViewerError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Writes to a location the user chose up front, ignoring the suggested name.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SaveSink for FileSink {
    fn save(&self, _file_name: &str, bytes: &[u8]) -> Result<PathBuf, ViewerError> {
        std::fs::write(&self.path, bytes)?;
        Ok(self.path.clone())
    }
}

/// PNG export with an SVG fallback. A picker, when present, is tried first
/// for PNG output; the download sink is used otherwise.
pub struct Exporter {
    config: ExportConfig,
    picker: Option<Box<dyn SaveSink>>,
    download: Box<dyn SaveSink>,
}

impl Exporter {
    pub fn new(config: ExportConfig, download: Box<dyn SaveSink>) -> Self {
        Self {
            config,
            picker: None,
            download,
        }
    }

    pub fn with_picker(mut self, picker: Box<dyn SaveSink>) -> Self {
        self.picker = Some(picker);
        self
    }

    pub fn export(&self, svg: &str) -> Result<ExportOutcome, ViewerError> {
        match self.rasterize(svg) {
            Ok(png) => self.store_png(&png),
            Err(err) => {
                warn!("{err}; saving SVG instead");
                let path = self.download.save(ExportFormat::Svg.file_name(), svg.as_bytes())?;
                info!("saved {}", path.display());
                Ok(ExportOutcome {
                    path,
                    format: ExportFormat::Svg,
                    via: SaveRoute::Download,
                    fallback_reason: Some(err.to_string()),
                })
            }
        }
    }

    fn store_png(&self, png: &[u8]) -> Result<ExportOutcome, ViewerError> {
        let name = ExportFormat::Png.file_name();
        let mut route = SaveRoute::Download;
        if let Some(picker) = &self.picker {
            match picker.save(name, png) {
                Ok(path) => {
                    info!("saved {}", path.display());
                    return Ok(ExportOutcome {
                        path,
                        format: ExportFormat::Png,
                        via: SaveRoute::Picker,
                        fallback_reason: None,
                    });
                }
                Err(err) => {
                    warn!("save picker failed ({err}); downloading instead");
                    route = SaveRoute::DownloadFallback;
                }
            }
        }
        let path = self.download.save(name, png)?;
        info!("saved {}", path.display());
        Ok(ExportOutcome {
            path,
            format: ExportFormat::Png,
            via: route,
            fallback_reason: None,
        })
    }

    /// Strips external resources, then renders to PNG on a worker thread.
    /// Exceeding `timeout_ms` counts as failure. A timed-out worker is not
    /// cancelled: it runs to completion in the background and its result is
    /// dropped. System fonts are loaded once per process and shared, so a
    /// late worker never repeats that scan.
    pub fn rasterize(&self, svg: &str) -> Result<Vec<u8>, ViewerError> {
        let cleaned = svg::strip_external_resources(svg);
        let config = self.config.clone();
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(render_png(&cleaned, &config));
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(ViewerError::Export("PNG render timed out.".to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ViewerError::Export("PNG export failed.".to_string()))
            }
        }
    }
}

/// Canvas size: the viewBox, else the parsed size, else the configured default.
fn canvas_size(
    view_box: Option<(f32, f32, f32, f32)>,
    parsed: Option<(f32, f32)>,
    config: &ExportConfig,
) -> (u32, u32) {
    let (width, height) = view_box
        .map(|(_, _, w, h)| (w, h))
        .filter(|(w, h)| *w > 0.0 && *h > 0.0)
        .or(parsed.filter(|(w, h)| *w > 0.0 && *h > 0.0))
        .unwrap_or((config.default_width, config.default_height));
    (width.max(1.0).round() as u32, height.max(1.0).round() as u32)
}

fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().strip_prefix('#')?;
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |idx: usize| u8::from_str_radix(&expanded[idx..idx + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(feature = "png")]
static SYSTEM_FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
});

#[cfg(feature = "png")]
fn render_png(svg: &str, config: &ExportConfig) -> Result<Vec<u8>, ViewerError> {
    use resvg::tiny_skia;

    let mut opt = usvg::Options::default();
    opt.font_family = config.font_family.clone();
    opt.fontdb = Arc::clone(&SYSTEM_FONTS);
    if let Some(size) = usvg::Size::from_wh(config.default_width, config.default_height) {
        opt.default_size = size;
    }

    let tree = usvg::Tree::from_str(svg, &opt)
        .map_err(|err| ViewerError::Export(format!("PNG export failed to load SVG: {err}")))?;
    let tree_size = tree.size();
    let (width, height) = canvas_size(
        svg::view_box(svg),
        Some((tree_size.width(), tree_size.height())),
        config,
    );

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ViewerError::Export("Failed to allocate pixmap".to_string()))?;
    let (r, g, b) = parse_hex_color(&config.background).unwrap_or((0x0b, 0x10, 0x20));
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, 255));

    let transform = tiny_skia::Transform::from_scale(
        width as f32 / tree_size.width(),
        height as f32 / tree_size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    pixmap
        .encode_png()
        .map_err(|err| ViewerError::Export(format!("PNG export failed: {err}")))
}

#[cfg(not(feature = "png"))]
fn render_png(_svg: &str, _config: &ExportConfig) -> Result<Vec<u8>, ViewerError> {
    Err(ViewerError::Export(
        "PNG export failed: built without the `png` feature".to_string(),
    ))
}

/// Writes a string to `output`, or to stdout when no path is given.
pub fn write_output(text: &str, output: Option<&Path>) -> Result<(), ViewerError> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
        }
        None => {
            print!("{}", text);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct MemorySink {
        name: &'static str,
        fail: bool,
        saved: RefCell<Vec<(String, Vec<u8>)>>,
    }

    impl MemorySink {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                saved: RefCell::new(Vec::new()),
            }
        }
    }

    impl SaveSink for MemorySink {
        fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ViewerError> {
            if self.fail {
                return Err(ViewerError::Export("picker cancelled".to_string()));
            }
            self.saved.borrow_mut().push((file_name.to_string(), bytes.to_vec()));
            Ok(PathBuf::from(self.name).join(file_name))
        }
    }

    impl SaveSink for std::rc::Rc<MemorySink> {
        fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ViewerError> {
            self.as_ref().save(file_name, bytes)
        }
    }

    #[test]
    fn canvas_size_fallback_chain() {
        let config = ExportConfig::default();
        assert_eq!(
            canvas_size(Some((0.0, 0.0, 320.4, 99.6)), Some((10.0, 10.0)), &config),
            (320, 100)
        );
        assert_eq!(canvas_size(Some((0.0, 0.0, 0.0, 0.0)), Some((10.0, 20.0)), &config), (10, 20));
        assert_eq!(canvas_size(None, None, &config), (1600, 900));
    }

    #[test]
    fn parses_hex_background() {
        assert_eq!(parse_hex_color("#0b1020"), Some((0x0b, 0x10, 0x20)));
        assert_eq!(parse_hex_color("#fff"), Some((255, 255, 255)));
        assert_eq!(parse_hex_color("white"), None);
    }

    #[test]
    fn rasterize_failure_falls_back_to_svg() {
        let download = std::rc::Rc::new(MemorySink::new("downloads", false));
        let exporter = Exporter::new(ExportConfig::default(), Box::new(download.clone()));
        let broken = "<svg xmlns=\"http://www.w3.org/2000/svg\"><g></svg>";
        let outcome = exporter.export(broken).unwrap();
        assert_eq!(outcome.format, ExportFormat::Svg);
        assert_eq!(outcome.path, PathBuf::from("downloads/diagram.svg"));
        assert!(outcome.is_fallback());
        assert!(outcome.describe().starts_with("PNG export failed"));
        let saved = download.saved.borrow();
        assert_eq!(saved[0].0, "diagram.svg");
        assert_eq!(saved[0].1, broken.as_bytes());
    }

    #[test]
    fn svg_fallback_write_failure_is_an_error() {
        let exporter = Exporter::new(
            ExportConfig::default(),
            Box::new(MemorySink::new("downloads", true)),
        );
        let err = exporter
            .export("<svg xmlns=\"http://www.w3.org/2000/svg\"><g></svg>")
            .unwrap_err();
        assert_eq!(err.to_string(), "picker cancelled");
    }

    #[cfg(feature = "png")]
    #[test]
    fn picker_success_skips_download() {
        let download = std::rc::Rc::new(MemorySink::new("downloads", false));
        let picker = std::rc::Rc::new(MemorySink::new("chosen", false));
        let exporter = Exporter::new(ExportConfig::default(), Box::new(download.clone()))
            .with_picker(Box::new(picker.clone()));
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 10"><rect width="20" height="10"/></svg>"#;
        let outcome = exporter.export(svg).unwrap();
        assert_eq!(outcome.via, SaveRoute::Picker);
        assert_eq!(outcome.path, PathBuf::from("chosen/diagram.png"));
        assert_eq!(outcome.describe(), "Saved PNG.");
        assert!(!outcome.is_fallback());
        assert!(download.saved.borrow().is_empty());
        assert!(picker.saved.borrow()[0].1.starts_with(b"\x89PNG"));
    }

    #[cfg(feature = "png")]
    #[test]
    fn picker_failure_downloads_png() {
        let download = std::rc::Rc::new(MemorySink::new("downloads", false));
        let exporter = Exporter::new(ExportConfig::default(), Box::new(download.clone()))
            .with_picker(Box::new(MemorySink::new("picker", true)));
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 40 30"><rect width="40" height="30" fill="red"/></svg>"#;
        let outcome = exporter.export(svg).unwrap();
        assert_eq!(outcome.format, ExportFormat::Png);
        assert_eq!(outcome.via, SaveRoute::DownloadFallback);
        assert_eq!(outcome.describe(), "Saved PNG (fallback).");
        let saved = download.saved.borrow();
        assert!(saved[0].1.starts_with(b"\x89PNG"));
    }

    #[cfg(feature = "png")]
    #[test]
    fn png_matches_view_box_size() {
        let exporter = Exporter::new(
            ExportConfig::default(),
            Box::new(DirectorySink::new("unused")),
        );
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 64 32"><circle cx="16" cy="16" r="8"/></svg>"#;
        let png = exporter.rasterize(svg).unwrap();
        // IHDR width and height, big-endian, right after the 8-byte signature and chunk header.
        assert_eq!(&png[16..20], &64u32.to_be_bytes());
        assert_eq!(&png[20..24], &32u32.to_be_bytes());
    }

    #[test]
    fn directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        let path = sink.save("diagram.svg", b"<svg/>").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"<svg/>");
    }
}
