use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::bitmap;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    cap_height: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn measure(&self, text: &str, font_size: f32) -> f32 {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return bitmap::text_width(text, font_size);
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f32 * (font_size / self.units_per_em.max(1) as f32)
    }

    /// Centres the span from cap height down to the descender inside a
    /// `font_size`-tall slot.
    fn baseline_offset(&self, font_size: f32) -> f32 {
        let em = self.units_per_em.max(1) as f32;
        let cap = (self.cap_height.max(0) as f32 / em).min(1.0);
        let descent = (-(self.descender.min(0) as f32) / em).min(0.5);
        font_size * (1.0 + cap - descent) / 2.0
    }
}

/// Where a font may be loaded from, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    File(PathBuf),
    Family(String),
}

impl std::fmt::Display for FontSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontSource::File(path) => write!(f, "file {}", path.display()),
            FontSource::Family(family) => write!(f, "family {}", family),
        }
    }
}

/// Font used to measure and draw overlay text.
#[derive(Debug, Clone)]
pub enum GlyphSource {
    Outline(FontMetrics),
    /// Built-in 5x7 bitmap font; always available.
    Bitmap,
}

impl GlyphSource {
    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        match self {
            GlyphSource::Outline(metrics) => metrics.measure(text, font_size),
            GlyphSource::Bitmap => bitmap::text_width(text, font_size),
        }
    }

    /// Distance from the top of a line slot to its baseline.
    pub fn baseline_offset(&self, font_size: f32) -> f32 {
        match self {
            GlyphSource::Outline(metrics) => metrics.baseline_offset(font_size),
            GlyphSource::Bitmap => bitmap::ascent(font_size),
        }
    }

    pub fn family(&self) -> Option<&str> {
        match self {
            GlyphSource::Outline(metrics) => metrics.family(),
            GlyphSource::Bitmap => None,
        }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self, GlyphSource::Bitmap)
    }
}

#[cfg(target_os = "macos")]
fn fallback_families() -> &'static [&'static str] {
    &["Apple SD Gothic Neo", "AppleGothic", "Hiragino Sans", "sans-serif"]
}

#[cfg(target_os = "windows")]
fn fallback_families() -> &'static [&'static str] {
    &["Malgun Gothic", "Arial Unicode MS", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_families() -> &'static [&'static str] {
    &["NanumBarunGothic", "Noto Sans CJK KR", "Noto Sans", "sans-serif"]
}

#[cfg(target_os = "macos")]
fn fallback_paths() -> &'static [&'static str] {
    &[
        "/System/Library/Fonts/AppleSDGothicNeo.ttc",
        "/System/Library/Fonts/Supplemental/AppleGothic.ttf",
    ]
}

#[cfg(target_os = "windows")]
fn fallback_paths() -> &'static [&'static str] {
    &["C:\\Windows\\Fonts\\malgun.ttf", "C:\\Windows\\Fonts\\arial.ttf"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_paths() -> &'static [&'static str] {
    &[
        "/usr/share/fonts/truetype/nanum/NanumBarunGothic.ttf",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "assets/fonts/NanumBarunGothic.ttf",
    ]
}

/// Builds the ordered source list: configured font first, then extra
/// paths, then the platform defaults.
pub fn default_font_sources(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    extra_paths: &[PathBuf],
) -> Vec<FontSource> {
    let mut sources = Vec::new();
    if let Some(path) = font_path {
        sources.push(FontSource::File(path.to_path_buf()));
    }
    if let Some(family) = font_family.filter(|family| !family.trim().is_empty()) {
        sources.push(FontSource::Family(family.trim().to_string()));
    }
    sources.extend(extra_paths.iter().cloned().map(FontSource::File));
    sources.extend(
        fallback_paths()
            .iter()
            .map(|path| FontSource::File(PathBuf::from(path))),
    );
    sources.extend(
        fallback_families()
            .iter()
            .map(|family| FontSource::Family(family.to_string())),
    );
    sources
}

/// Returns the first source that loads, or the bitmap font when none do.
pub fn resolve_glyph_source(sources: &[FontSource]) -> GlyphSource {
    let mut db: Option<fontdb::Database> = None;
    for source in sources {
        let loaded = match source {
            FontSource::File(path) => load_font_metrics(path),
            FontSource::Family(family) => {
                let db = db.get_or_insert_with(|| {
                    let mut db = fontdb::Database::new();
                    db.load_system_fonts();
                    db
                });
                load_font_metrics_from_family(db, family)
            }
        };
        match loaded {
            Ok(metrics) => {
                debug!(
                    "overlay font resolved from {} ({})",
                    source,
                    metrics.family().unwrap_or("unnamed")
                );
                return GlyphSource::Outline(metrics);
            }
            Err(err) => debug!("font {} unavailable: {:#}", source, err),
        }
    }
    warn!("no usable overlay font found; falling back to the built-in bitmap font");
    GlyphSource::Bitmap
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

fn load_font_metrics_from_data(data: Vec<u8>, preferred_index: Option<u32>) -> Result<FontMetrics> {
    let data = Arc::new(data);
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(&data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: Arc::clone(&data),
            units_per_em,
            space_advance,
            cap_height: face
                .capital_height()
                .filter(|height| *height > 0)
                .unwrap_or_else(|| (face.ascender().max(0) as f32 * 0.75) as i16),
            descender: face.descender(),
            family,
            face_index: index,
        };
        if preferred_index == Some(index) {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(data, Some(index))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
