use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod error;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod settings;
mod test_util;
pub mod translator;

pub use error::{CollaboratorError, PipelineError};
pub use pipeline::{ImageTranslationPipeline, PipelineOptions, PipelineStage};
pub use translator::RegionTranslator;

use ocr::{
    ExtractionGranularity, OverlayCompositor, TextRegionExtractor, TypesetEngine,
    default_font_sources, resolve_glyph_source,
};
use providers::{AzureDocumentIntelligence, AzureTranslator};
use settings::Settings;

#[derive(Debug, Clone)]
pub struct Config {
    pub image: PathBuf,
    pub lang: String,
    pub source_lang: String,
    pub output: Option<PathBuf>,
    pub granularity: Option<ExtractionGranularity>,
    pub settings_path: Option<String>,
    pub debug_ocr: bool,
}

/// Translates `config.image` and returns the written output path, or `None`
/// when the image contains no text.
pub async fn run(config: Config) -> Result<Option<PathBuf>> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    settings.apply_env();
    if let Some(granularity) = config.granularity {
        settings.granularity = granularity;
    }
    if config.debug_ocr {
        settings.ocr_debug = true;
    }

    let target = config.lang.trim();
    if target.is_empty() {
        return Err(anyhow!("target language is empty"));
    }
    if !config.image.exists() {
        return Err(anyhow!("image not found: {}", config.image.display()));
    }

    let pipeline = build_pipeline(&settings)?;
    let output = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&config.image));
    let written = pipeline
        .translate_image(&config.image, &config.source_lang, target, &output)
        .await
        .with_context(|| format!("failed to translate {}", config.image.display()))?;
    Ok(written)
}

/// Wires the Azure collaborators, font chain and overlay style from settings.
pub fn build_pipeline(
    settings: &Settings,
) -> Result<ImageTranslationPipeline<AzureDocumentIntelligence, AzureTranslator>> {
    let endpoint = settings.azure_document_endpoint.clone().ok_or_else(|| {
        anyhow!(
            "Document Intelligence endpoint is not configured (set AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT or [azure].document_endpoint)"
        )
    })?;
    let key = settings.azure_document_key.clone().ok_or_else(|| {
        anyhow!(
            "Document Intelligence key is not configured (set AZURE_DOCUMENT_INTELLIGENCE_KEY or [azure].document_key)"
        )
    })?;
    let translator_key = settings.azure_translator_key.clone().ok_or_else(|| {
        anyhow!("Translator key is not configured (set TRANSLATOR_API_KEY or [azure].translator_key)")
    })?;
    let style = settings.overlay_style()?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .with_context(|| "failed to build HTTP client")?;
    let analyzer = AzureDocumentIntelligence::new(endpoint, key)
        .with_model(settings.azure_document_model.clone())
        .with_client(client.clone());
    let mut translator = AzureTranslator::new(translator_key)
        .with_region(settings.azure_translator_region.clone())
        .with_client(client);
    if let Some(endpoint) = settings.azure_translator_endpoint.as_ref() {
        translator = translator.with_endpoint(endpoint.clone());
    }

    let extra_fonts = settings
        .overlay_font_paths
        .iter()
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    let sources = default_font_sources(
        settings.overlay_font_path.as_deref().map(Path::new),
        settings.overlay_font_family.as_deref(),
        &extra_fonts,
    );
    let glyphs = resolve_glyph_source(&sources);
    info!(
        "regions grouped by {}; overlay font: {}",
        settings.granularity.as_str(),
        glyphs.family().unwrap_or("built-in bitmap")
    );

    let extractor = TextRegionExtractor::new(analyzer, settings.granularity.strategy())
        .with_timeout(Duration::from_secs(settings.ocr_timeout_secs));
    let translator = RegionTranslator::new(translator)
        .with_timeout(Duration::from_secs(settings.translate_timeout_secs))
        .with_concurrency(settings.translate_concurrency);
    let typesetter = TypesetEngine::new(glyphs.clone(), settings.typeset.clone());
    let compositor = OverlayCompositor::new(glyphs, style);

    Ok(
        ImageTranslationPipeline::new(extractor, translator, typesetter, compositor).with_options(
            PipelineOptions {
                normalize_in_place: settings.normalize_in_place,
                debug_regions: settings.ocr_debug,
            },
        ),
    )
}

/// `<dir>/<stem>_translated.png` next to the input.
pub fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string());
    image.with_file_name(format!("{}_translated.png", stem))
}
