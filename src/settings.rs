use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::{ExtractionGranularity, OverlayStyle, Rgba, TypesetConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub granularity: ExtractionGranularity,
    pub ocr_debug: bool,
    pub typeset: TypesetConfig,
    pub overlay_fill_color: String,
    pub overlay_fill_alpha: u8,
    pub overlay_text_color: String,
    pub overlay_corner_radius: f32,
    pub overlay_font_path: Option<String>,
    pub overlay_font_family: Option<String>,
    pub overlay_font_paths: Vec<String>,
    pub normalize_in_place: bool,
    pub ocr_timeout_secs: u64,
    pub translate_timeout_secs: u64,
    pub translate_concurrency: usize,
    pub azure_document_endpoint: Option<String>,
    pub azure_document_key: Option<String>,
    pub azure_document_model: String,
    pub azure_translator_endpoint: Option<String>,
    pub azure_translator_key: Option<String>,
    pub azure_translator_region: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            granularity: ExtractionGranularity::default(),
            ocr_debug: false,
            typeset: TypesetConfig::default(),
            overlay_fill_color: "#ffe6e6".to_string(),
            overlay_fill_alpha: 210,
            overlay_text_color: "#1e1e1e".to_string(),
            overlay_corner_radius: 6.0,
            overlay_font_path: None,
            overlay_font_family: None,
            overlay_font_paths: Vec::new(),
            normalize_in_place: false,
            ocr_timeout_secs: 60,
            translate_timeout_secs: 15,
            translate_concurrency: 4,
            azure_document_endpoint: None,
            azure_document_key: None,
            azure_document_model: "prebuilt-read".to_string(),
            azure_translator_endpoint: None,
            azure_translator_key: None,
            azure_translator_region: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    typeset: Option<TypesetSettings>,
    overlay: Option<OverlaySettings>,
    pipeline: Option<PipelineSettings>,
    azure: Option<AzureSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    granularity: Option<ExtractionGranularity>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TypesetSettings {
    size_factor: Option<f32>,
    min_initial_size: Option<u32>,
    width_tolerance: Option<f32>,
    leading: Option<f32>,
    padding_x: Option<f32>,
    padding_y: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    fill_color: Option<String>,
    fill_alpha: Option<u8>,
    text_color: Option<String>,
    corner_radius: Option<f32>,
    font_path: Option<String>,
    font_family: Option<String>,
    font_paths: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    normalize_in_place: Option<bool>,
    ocr_timeout_secs: Option<u64>,
    translate_timeout_secs: Option<u64>,
    translate_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureSettings {
    document_endpoint: Option<String>,
    document_key: Option<String>,
    document_model: Option<String>,
    translator_endpoint: Option<String>,
    translator_key: Option<String>,
    translator_region: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(granularity) = ocr.granularity {
                self.granularity = granularity;
            }
            if let Some(debug) = ocr.debug {
                self.ocr_debug = debug;
            }
        }
        if let Some(typeset) = incoming.typeset {
            let config = &mut self.typeset;
            if let Some(value) = typeset.size_factor.filter(|value| *value > 0.0) {
                config.size_factor = value;
            }
            if let Some(value) = typeset.min_initial_size {
                config.min_initial_size = value;
            }
            if let Some(value) = typeset.width_tolerance.filter(|value| *value > 0.0) {
                config.width_tolerance = value;
            }
            if let Some(value) = typeset.leading.filter(|value| *value > 0.0) {
                config.leading = value;
            }
            if let Some(value) = typeset.padding_x.filter(|value| *value >= 0.0) {
                config.padding_x = value;
            }
            if let Some(value) = typeset.padding_y.filter(|value| *value >= 0.0) {
                config.padding_y = value;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(color) = non_empty(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(alpha) = overlay.fill_alpha {
                self.overlay_fill_alpha = alpha;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay_text_color = color;
            }
            if let Some(radius) = overlay.corner_radius.filter(|radius| *radius >= 0.0) {
                self.overlay_corner_radius = radius;
            }
            if let Some(path) = non_empty(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(family) = non_empty(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(paths) = overlay.font_paths {
                self.overlay_font_paths = paths;
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            if let Some(value) = pipeline.normalize_in_place {
                self.normalize_in_place = value;
            }
            if let Some(secs) = pipeline.ocr_timeout_secs.filter(|secs| *secs > 0) {
                self.ocr_timeout_secs = secs;
            }
            if let Some(secs) = pipeline.translate_timeout_secs.filter(|secs| *secs > 0) {
                self.translate_timeout_secs = secs;
            }
            if let Some(limit) = pipeline.translate_concurrency.filter(|limit| *limit > 0) {
                self.translate_concurrency = limit;
            }
        }
        if let Some(azure) = incoming.azure {
            if let Some(value) = non_empty(azure.document_endpoint) {
                self.azure_document_endpoint = Some(value);
            }
            if let Some(value) = non_empty(azure.document_key) {
                self.azure_document_key = Some(value);
            }
            if let Some(value) = non_empty(azure.document_model) {
                self.azure_document_model = value;
            }
            if let Some(value) = non_empty(azure.translator_endpoint) {
                self.azure_translator_endpoint = Some(value);
            }
            if let Some(value) = non_empty(azure.translator_key) {
                self.azure_translator_key = Some(value);
            }
            if let Some(value) = non_empty(azure.translator_region) {
                self.azure_translator_region = Some(value);
            }
        }
    }

    /// Environment variables take precedence over every settings file.
    pub fn apply_env(&mut self) {
        let env = |name: &str| non_empty(std::env::var(name).ok());
        if let Some(value) = env("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT") {
            self.azure_document_endpoint = Some(value);
        }
        if let Some(value) = env("AZURE_DOCUMENT_INTELLIGENCE_KEY") {
            self.azure_document_key = Some(value);
        }
        if let Some(value) = env("TRANSLATOR_ENDPOINT") {
            self.azure_translator_endpoint = Some(value);
        }
        if let Some(value) = env("TRANSLATOR_API_KEY") {
            self.azure_translator_key = Some(value);
        }
        if let Some(value) = env("TRANSLATOR_REGION") {
            self.azure_translator_region = Some(value);
        }
    }

    pub fn overlay_style(&self) -> Result<OverlayStyle> {
        let fill = Rgba::from_hex(&self.overlay_fill_color)
            .with_context(|| "invalid overlay.fill_color")?
            .with_alpha(self.overlay_fill_alpha);
        let text = Rgba::from_hex(&self.overlay_text_color)
            .with_context(|| "invalid overlay.text_color")?;
        Ok(OverlayStyle {
            fill,
            text,
            corner_radius: self.overlay_corner_radius,
        })
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".overlay-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn embedded_defaults_match_builtin_defaults() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("parse");
        let mut settings = Settings::default();
        settings.merge(parsed);
        assert_eq!(settings.granularity, ExtractionGranularity::Line);
        assert_eq!(settings.typeset, TypesetConfig::default());
        assert_eq!(settings.overlay_style().expect("style"), OverlayStyle::default());
        assert_eq!(settings.translate_concurrency, 4);
        assert_eq!(settings.azure_document_model, "prebuilt-read");
    }

    #[test]
    fn later_files_override_field_by_field() {
        with_temp_home(|home| {
            let extra = home.join("custom.toml");
            fs::write(
                &extra,
                r##"
[ocr]
granularity = "paragraph"

[overlay]
fill_color = "#ffffff"
font_family = "  "

[pipeline]
translate_concurrency = 0
"##,
            )
            .expect("write");
            let settings = load_settings(Some(&extra)).expect("settings");
            assert_eq!(settings.granularity, ExtractionGranularity::Paragraph);
            assert_eq!(settings.overlay_fill_color, "#ffffff");
            assert_eq!(settings.overlay_fill_alpha, 210);
            assert_eq!(settings.overlay_font_family, None);
            assert_eq!(settings.translate_concurrency, 4);
            assert!(home.join(".overlay-translator-rust/settings.toml").exists());
        });
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("nope.toml"))).expect_err("missing");
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn invalid_granularity_is_reported_with_path() {
        with_temp_home(|home| {
            let extra = home.join("bad.toml");
            fs::write(&extra, "[ocr]\ngranularity = \"column\"\n").expect("write");
            let err = load_settings(Some(&extra)).expect_err("invalid");
            assert!(format!("{:#}", err).contains("bad.toml"));
        });
    }

    #[test]
    fn bad_colors_fail_style_construction() {
        let settings = Settings {
            overlay_text_color: "dark".to_string(),
            ..Settings::default()
        };
        assert!(settings.overlay_style().is_err());
    }
}
