use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::ocr::{
    OverlayCompositor, TextRegion, TextRegionExtractor, TypesetEngine, WorkingImage,
    render_region_debug,
};
use crate::providers::{LayoutAnalyzer, TextTranslator};
use crate::translator::RegionTranslator;

/// Stages of a single image translation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loaded,
    Normalized,
    RegionsExtracted,
    NoRegionsFound,
    Translated,
    Typeset,
    Composited,
    Saved,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Loaded => "loaded",
            PipelineStage::Normalized => "normalized",
            PipelineStage::RegionsExtracted => "regions-extracted",
            PipelineStage::NoRegionsFound => "no-regions-found",
            PipelineStage::Translated => "translated",
            PipelineStage::Typeset => "typeset",
            PipelineStage::Composited => "composited",
            PipelineStage::Saved => "saved",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Write the upright pixels back over the input file when a rotation was applied.
    pub normalize_in_place: bool,
    /// Write `<stem>.regions.png` / `<stem>.regions.json` next to the output.
    pub debug_regions: bool,
}

pub struct ImageTranslationPipeline<L, T> {
    extractor: TextRegionExtractor<L>,
    translator: RegionTranslator<T>,
    typesetter: TypesetEngine,
    compositor: OverlayCompositor,
    options: PipelineOptions,
}

impl<L: LayoutAnalyzer, T: TextTranslator> ImageTranslationPipeline<L, T> {
    pub fn new(
        extractor: TextRegionExtractor<L>,
        translator: RegionTranslator<T>,
        typesetter: TypesetEngine,
        compositor: OverlayCompositor,
    ) -> Self {
        Self {
            extractor,
            translator,
            typesetter,
            compositor,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Translates the text in `image_path` and writes the overlaid image to
    /// `output_path`. Returns `Ok(None)` when the image has no text regions,
    /// in which case nothing is written.
    pub async fn translate_image(
        &self,
        image_path: &Path,
        source_lang: &str,
        target_lang: &str,
        output_path: &Path,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let bytes = std::fs::read(image_path).map_err(|source| PipelineError::Read {
            path: image_path.to_path_buf(),
            source,
        })?;
        let mut working = WorkingImage::decode(&bytes).map_err(|source| PipelineError::Decode {
            path: image_path.to_path_buf(),
            source,
        })?;
        enter(PipelineStage::Loaded);

        if working.normalize() && self.options.normalize_in_place {
            write_image_atomic(image_path, &working.image)?;
            info!("wrote upright pixels back to {}", image_path.display());
        }
        enter(PipelineStage::Normalized);

        let png = encode(&working.image, ImageFormat::Png)?;
        let regions = self
            .extractor
            .extract(png)
            .await
            .map_err(PipelineError::ExtractionFailed)?;
        enter(PipelineStage::RegionsExtracted);
        debug!(
            "{} region(s) via {} strategy",
            regions.len(),
            self.extractor.strategy_name()
        );

        if self.options.debug_regions {
            write_region_debug(&working.image, &regions, output_path);
        }
        if regions.is_empty() {
            enter(PipelineStage::NoRegionsFound);
            return Ok(None);
        }

        let translated = self
            .translator
            .translate_regions(regions, source_lang, target_lang)
            .await;
        enter(PipelineStage::Translated);

        let specs = self.typesetter.typeset_all(&translated);
        enter(PipelineStage::Typeset);
        debug!(
            "{} of {} region(s) produce an overlay",
            specs.len(),
            translated.len()
        );

        let output = self.compositor.composite(&working.image, &specs)?;
        enter(PipelineStage::Composited);

        write_image_atomic(output_path, &DynamicImage::ImageRgb8(output))?;
        enter(PipelineStage::Saved);
        Ok(Some(output_path.to_path_buf()))
    }
}

fn enter(stage: PipelineStage) {
    debug!("pipeline stage: {}", stage.as_str());
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

/// Encodes by extension (PNG when unknown) and atomically replaces `path`.
fn write_image_atomic(path: &Path, image: &DynamicImage) -> Result<(), PipelineError> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let encoded = match format {
        ImageFormat::Jpeg => encode(&DynamicImage::ImageRgb8(image.to_rgb8()), format)?,
        _ => encode(image, format)?,
    };
    let write_err = |source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".overlay-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    temp.write_all(&encoded).map_err(write_err)?;
    temp.flush().map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

fn write_region_debug(image: &DynamicImage, regions: &[TextRegion], output_path: &Path) {
    let png_path = output_path.with_extension("regions.png");
    let json_path = output_path.with_extension("regions.json");
    let result = render_region_debug(image, regions)
        .and_then(|overlay| write_image_atomic(&png_path, &DynamicImage::ImageRgb8(overlay)));
    if let Err(err) = result {
        warn!("failed to write region debug image {}: {}", png_path.display(), err);
    }
    match serde_json::to_string_pretty(regions) {
        Ok(json) => {
            if let Err(err) = std::fs::write(&json_path, json) {
                warn!("failed to write {}: {}", json_path.display(), err);
            }
        }
        Err(err) => warn!("failed to serialize regions: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    #[test]
    fn atomic_write_picks_format_from_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])));
        let jpeg = dir.path().join("out.jpg");
        let unknown = dir.path().join("out.bin");
        write_image_atomic(&jpeg, &image).expect("jpeg");
        write_image_atomic(&unknown, &image).expect("fallback");
        let jpeg_bytes = std::fs::read(&jpeg).expect("read jpeg");
        assert_eq!(&jpeg_bytes[..2], &[0xFF, 0xD8]);
        let png_bytes = std::fs::read(&unknown).expect("read png");
        assert_eq!(&png_bytes[..4], b"\x89PNG");
        let leftovers = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("missing").join("out.png");
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let err = write_image_atomic(&target, &image).expect_err("missing dir");
        assert!(matches!(err, PipelineError::Write { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn debug_output_lands_next_to_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("sign_translated.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([9, 9, 9])));
        let regions = vec![TextRegion::new("EXIT", 2.0, 2.0, 20.0, 10.0)];
        write_region_debug(&image, &regions, &output);
        let overlay = image::open(dir.path().join("sign_translated.regions.png")).expect("png");
        assert_eq!(overlay.dimensions(), (40, 20));
        let json = std::fs::read_to_string(dir.path().join("sign_translated.regions.json"))
            .expect("json");
        assert!(json.contains("\"text\": \"EXIT\""));
        assert!(!output.exists());
    }
}
