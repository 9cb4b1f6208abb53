use anyhow::{Result, anyhow};
use image::{DynamicImage, RgbImage};
use resvg::render;
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, IntSize, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform,
};
use tracing::debug;
use usvg::{Options, Tree, fontdb};

use super::bitmap;
use super::font::GlyphSource;
use super::{Rect, RenderSpec, TextRegion};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb` or `#rrggbbaa` (the `#` is optional).
    pub fn from_hex(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!("invalid color '{}': expected #rrggbb", value));
        }
        let channel = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16);
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }

    fn color(&self) -> Color {
        Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub fill: Rgba,
    pub text: Rgba,
    pub corner_radius: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill: Rgba::new(0xff, 0xe6, 0xe6, 210),
            text: Rgba::new(0x1e, 0x1e, 0x1e, 255),
            corner_radius: 6.0,
        }
    }
}

/// Draws render specs onto a transparent layer and blends it over the base image.
pub struct OverlayCompositor {
    glyphs: GlyphSource,
    style: OverlayStyle,
    fontdb: Option<(Arc<fontdb::Database>, String)>,
}

impl OverlayCompositor {
    pub fn new(glyphs: GlyphSource, style: OverlayStyle) -> Self {
        let fontdb = match &glyphs {
            GlyphSource::Outline(metrics) => {
                let mut db = fontdb::Database::new();
                db.load_font_data(metrics.data().to_vec());
                let family = metrics.family().map(str::to_string).or_else(|| {
                    db.faces()
                        .next()
                        .and_then(|face| face.families.first())
                        .map(|(name, _)| name.clone())
                });
                family.map(|family| {
                    db.set_sans_serif_family(family.clone());
                    (Arc::new(db), family)
                })
            }
            GlyphSource::Bitmap => None,
        };
        Self {
            glyphs,
            style,
            fontdb,
        }
    }

    /// Blends every spec over `base` in list order and flattens to RGB.
    pub fn composite(
        &self,
        base: &DynamicImage,
        specs: &[RenderSpec],
    ) -> Result<RgbImage, PipelineError> {
        if specs.is_empty() {
            return Ok(base.to_rgb8());
        }
        let layer = self.render_layer(base.width(), base.height(), specs)?;
        flatten_onto(base, &layer)
    }

    pub fn render_layer(
        &self,
        width: u32,
        height: u32,
        specs: &[RenderSpec],
    ) -> Result<Pixmap, PipelineError> {
        match (&self.glyphs, &self.fontdb) {
            (GlyphSource::Outline(_), Some((db, family))) => {
                let svg = self.overlay_svg(width, height, specs, family);
                rasterize_svg(&svg, width, height, Arc::clone(db))
            }
            _ => self.draw_bitmap_layer(width, height, specs),
        }
    }

    fn overlay_svg(&self, width: u32, height: u32, specs: &[RenderSpec], family: &str) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        for spec in specs {
            let Rect {
                x,
                y,
                width: box_w,
                height: box_h,
            } = spec.bbox;
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}" fill="{fill}" fill-opacity="{opacity}"/>"#,
                x = x,
                y = y,
                w = box_w,
                h = box_h,
                r = self.corner_radius(&spec.bbox),
                fill = self.style.fill.hex(),
                opacity = self.style.fill.opacity()
            ));
            let font_size = spec.font_size as f32;
            let center_x = x + box_w / 2.0;
            let baseline_offset = self.glyphs.baseline_offset(font_size);
            for (idx, line) in spec.lines.iter().enumerate() {
                let baseline =
                    y + spec.padding_y + idx as f32 * spec.line_height + baseline_offset;
                svg.push_str(&format!(
                    r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{color}" fill-opacity="{opacity}" text-anchor="middle">{text}</text>"#,
                    x = center_x,
                    y = baseline,
                    size = font_size,
                    family = escape_xml(family),
                    color = self.style.text.hex(),
                    opacity = self.style.text.opacity(),
                    text = escape_xml(line)
                ));
            }
        }
        svg.push_str("</svg>");
        svg
    }

    fn draw_bitmap_layer(
        &self,
        width: u32,
        height: u32,
        specs: &[RenderSpec],
    ) -> Result<Pixmap, PipelineError> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| PipelineError::Render(format!("invalid canvas {}x{}", width, height)))?;
        let mut fill = Paint::default();
        fill.set_color(self.style.fill.color());
        fill.anti_alias = true;
        for spec in specs {
            if let Some(path) = rounded_rect_path(&spec.bbox, self.corner_radius(&spec.bbox)) {
                pixmap.fill_path(&path, &fill, FillRule::Winding, Transform::identity(), None);
            }
            let font_size = spec.font_size as f32;
            for (idx, line) in spec.lines.iter().enumerate() {
                let line_width = spec
                    .line_widths
                    .get(idx)
                    .copied()
                    .unwrap_or_else(|| bitmap::text_width(line, font_size));
                let left = spec.bbox.x + (spec.bbox.width - line_width) / 2.0;
                let top = spec.bbox.y + spec.padding_y + idx as f32 * spec.line_height;
                bitmap::draw_text(&mut pixmap, line, left, top, font_size, self.style.text.color());
            }
        }
        Ok(pixmap)
    }

    fn corner_radius(&self, rect: &Rect) -> f32 {
        self.style
            .corner_radius
            .min(rect.width / 2.0)
            .min(rect.height / 2.0)
            .max(0.0)
    }
}

/// Strokes every region box in green over `base`.
pub fn render_region_debug(
    base: &DynamicImage,
    regions: &[TextRegion],
) -> Result<RgbImage, PipelineError> {
    let (width, height) = (base.width(), base.height());
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    for region in regions {
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#00c853" stroke-width="2"/>"##,
            x = region.x,
            y = region.y,
            w = region.width,
            h = region.height
        ));
    }
    svg.push_str("</svg>");
    let layer = rasterize_svg(&svg, width, height, Arc::new(fontdb::Database::new()))?;
    flatten_onto(base, &layer)
}

fn rasterize_svg(
    svg: &str,
    width: u32,
    height: u32,
    fontdb: Arc<fontdb::Database>,
) -> Result<Pixmap, PipelineError> {
    let options = Options {
        fontdb,
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options)
        .map_err(|err| PipelineError::Render(format!("failed to parse overlay SVG: {}", err)))?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| PipelineError::Render(format!("invalid canvas {}x{}", width, height)))?;
    render(&tree, Transform::identity(), &mut pixmap.as_mut());
    debug!("rasterized overlay layer {}x{}", width, height);
    Ok(pixmap)
}

fn rounded_rect_path(rect: &Rect, radius: f32) -> Option<Path> {
    let Rect {
        x,
        y,
        width: w,
        height: h,
    } = *rect;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let r = radius;
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.quad_to(x + w, y, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.quad_to(x + w, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.quad_to(x, y + h, x, y + h - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Draws `layer` over an opaque copy of `base` and drops the alpha channel.
fn flatten_onto(base: &DynamicImage, layer: &Pixmap) -> Result<RgbImage, PipelineError> {
    let (width, height) = (base.width(), base.height());
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| PipelineError::Render(format!("invalid canvas {}x{}", width, height)))?;
    let opaque = DynamicImage::ImageRgb8(base.to_rgb8()).to_rgba8();
    let mut canvas = Pixmap::from_vec(opaque.into_raw(), size)
        .ok_or_else(|| PipelineError::Render("failed to wrap base image".to_string()))?;
    canvas.draw_pixmap(
        0,
        0,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    let flattened = image::RgbaImage::from_raw(width, height, canvas.take())
        .ok_or_else(|| PipelineError::Render("overlay buffer size mismatch".to_string()))?;
    Ok(DynamicImage::ImageRgba8(flattened).to_rgb8())
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
