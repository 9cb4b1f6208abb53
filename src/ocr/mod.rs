mod bitmap;
mod extract;
mod font;
mod geom;
mod layout;
mod orientation;
mod render;

pub use extract::{
    ExtractionGranularity, LineStrategy, ParagraphStrategy, RegionExtractionStrategy,
    TextRegionExtractor,
};
pub use font::{
    FontMetrics, FontSource, GlyphSource, default_font_sources, load_font_metrics,
    resolve_glyph_source,
};
pub use geom::{bounding_rect, polygon_from_flat};
pub use layout::{FLOOR_SIZE, TypesetConfig, TypesetEngine};
pub use orientation::{WorkingImage, read_exif_orientation};
pub use render::{OverlayCompositor, OverlayStyle, Rgba, render_region_debug};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One unit of recognised text as returned by the layout collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub text: String,
    pub polygon: Vec<Point>,
}

impl TextUnit {
    pub fn new(text: impl Into<String>, polygon: Vec<Point>) -> Self {
        Self {
            text: text.into(),
            polygon,
        }
    }
}

/// Normalised layout collaborator response for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutDocument {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub lines: Vec<TextUnit>,
    pub paragraphs: Vec<TextUnit>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TextRegion {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Number of source text lines covered by the region.
    pub line_count: usize,
}

impl TextRegion {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            line_count: 1,
        }
    }

    pub fn with_line_count(mut self, line_count: usize) -> Self {
        self.line_count = line_count.max(1);
        self
    }

    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedRegion {
    pub region: TextRegion,
    pub translated_text: String,
}

/// Background box and wrapped lines to draw for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    pub font_size: u32,
    pub lines: Vec<String>,
    pub line_widths: Vec<f32>,
    pub line_height: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub bbox: Rect,
}
