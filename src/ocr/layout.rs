use tracing::debug;

use super::font::GlyphSource;
use super::{Rect, RenderSpec, TextRegion, TranslatedRegion};

/// Smallest font size the engine will shrink to. Text that still does not
/// fit at this size is rendered anyway.
pub const FLOOR_SIZE: u32 = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct TypesetConfig {
    /// Fraction of the per-line region height used as the starting size.
    pub size_factor: f32,
    pub min_initial_size: u32,
    /// Allowed overshoot of the region width before shrinking.
    pub width_tolerance: f32,
    pub leading: f32,
    pub padding_x: f32,
    pub padding_y: f32,
}

impl Default for TypesetConfig {
    fn default() -> Self {
        Self {
            size_factor: 0.75,
            min_initial_size: 10,
            width_tolerance: 1.1,
            leading: 1.2,
            padding_x: 0.4,
            padding_y: 0.2,
        }
    }
}

/// Chooses font size, line breaks and the padded patch for each region.
#[derive(Debug, Clone)]
pub struct TypesetEngine {
    glyphs: GlyphSource,
    config: TypesetConfig,
}

impl TypesetEngine {
    pub fn new(glyphs: GlyphSource, config: TypesetConfig) -> Self {
        Self { glyphs, config }
    }

    pub fn initial_size(&self, region: &TextRegion) -> u32 {
        let per_line = region.height / region.line_count.max(1) as f32;
        let estimate = (per_line * self.config.size_factor).floor();
        let estimate = if estimate.is_finite() && estimate > 0.0 {
            estimate as u32
        } else {
            0
        };
        estimate.max(self.config.min_initial_size).max(FLOOR_SIZE)
    }

    pub fn typeset_all(&self, regions: &[TranslatedRegion]) -> Vec<RenderSpec> {
        regions
            .iter()
            .filter_map(|region| self.typeset(region))
            .collect()
    }

    /// Returns `None` when the translation is blank.
    pub fn typeset(&self, translated: &TranslatedRegion) -> Option<RenderSpec> {
        let text = translated.translated_text.trim();
        if text.is_empty() {
            return None;
        }
        let region = &translated.region;
        let allowed_width = region.width * self.config.width_tolerance;
        let initial = self.initial_size(region);

        let multi_line = region.line_count > 1 || text.contains('\n');
        let (size, lines) = if multi_line {
            self.wrap_to_height(text, initial, allowed_width, region.height)
        } else {
            let size = self.shrink_to_width(text, initial, allowed_width);
            if self.measure(text, size) <= allowed_width {
                (size, vec![text.to_string()])
            } else {
                debug!(
                    "'{}' overflows {:.1}px at floor size; wrapping",
                    text, allowed_width
                );
                self.wrap_to_height(text, size, allowed_width, region.height)
            }
        };

        Some(self.place(region, size, lines))
    }

    fn measure(&self, text: &str, size: u32) -> f32 {
        self.glyphs.measure(text, size as f32)
    }

    fn shrink_to_width(&self, text: &str, initial: u32, allowed_width: f32) -> u32 {
        let mut size = initial;
        while self.measure(text, size) > allowed_width && size > FLOOR_SIZE {
            size -= 1;
        }
        size
    }

    fn wrap_to_height(
        &self,
        text: &str,
        initial: u32,
        allowed_width: f32,
        height: f32,
    ) -> (u32, Vec<String>) {
        let mut size = initial;
        loop {
            let lines = wrap_text(text, allowed_width, |part| self.measure(part, size));
            let total = lines.len() as f32 * size as f32 * self.config.leading;
            let widest = lines
                .iter()
                .map(|line| self.measure(line, size))
                .fold(0.0, f32::max);
            if (total <= height && widest <= allowed_width) || size <= FLOOR_SIZE {
                return (size, lines);
            }
            size -= 1;
        }
    }

    fn place(&self, region: &TextRegion, size: u32, lines: Vec<String>) -> RenderSpec {
        let font_size = size as f32;
        let line_height = font_size * self.config.leading;
        let line_widths = lines
            .iter()
            .map(|line| self.measure(line, size))
            .collect::<Vec<_>>();
        let block_width = line_widths.iter().copied().fold(0.0, f32::max);
        let block_height = font_size + (lines.len().saturating_sub(1)) as f32 * line_height;
        let padding_x = (font_size * self.config.padding_x).floor();
        let padding_y = (font_size * self.config.padding_y).floor();

        let width = block_width + padding_x * 2.0;
        let height = block_height + padding_y * 2.0;
        let bbox = Rect {
            x: region.x + (region.width - width) / 2.0,
            y: region.y + (region.height - height) / 2.0,
            width,
            height,
        };
        RenderSpec {
            font_size: size,
            lines,
            line_widths,
            line_height,
            padding_x,
            padding_y,
            bbox,
        }
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    )
}

fn tokenize_text(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' || ch.is_whitespace() || is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            let token = match ch {
                '\n' => "\n".to_string(),
                ch if ch.is_whitespace() => " ".to_string(),
                ch => ch.to_string(),
            };
            tokens.push(token);
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Greedy wrap. Ideographs and kana may break between any two characters;
/// `\n` always breaks. A single token wider than `max_width` keeps its own line.
pub(crate) fn wrap_text<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut result = Vec::new();
    let mut current = String::new();

    for token in tokenize_text(text) {
        if token == "\n" {
            if !current.trim().is_empty() {
                result.push(current.trim_end().to_string());
            }
            current.clear();
            continue;
        }
        if token == " " {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }
        let candidate = format!("{}{}", current, token);
        if measure(candidate.trim_end()) > max_width && !current.trim().is_empty() {
            result.push(current.trim_end().to_string());
            current = token;
        } else {
            current = candidate;
        }
    }
    if !current.trim().is_empty() {
        result.push(current.trim_end().to_string());
    }
    if result.is_empty() {
        result.push(text.trim().to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TypesetEngine {
        TypesetEngine::new(GlyphSource::Bitmap, TypesetConfig::default())
    }

    fn translated(text: &str, region: TextRegion) -> TranslatedRegion {
        TranslatedRegion {
            region,
            translated_text: text.to_string(),
        }
    }

    #[test]
    fn short_translation_is_centered_on_its_region() {
        let spec = engine()
            .typeset(&translated("닫힘", TextRegion::new("CLOSED", 10.0, 10.0, 120.0, 30.0)))
            .expect("spec");
        assert_eq!(spec.font_size, 22);
        assert_eq!(spec.lines, vec!["닫힘".to_string()]);
        assert_eq!(spec.padding_x, 8.0);
        assert_eq!(spec.padding_y, 4.0);
        assert_eq!(
            spec.bbox,
            Rect {
                x: 45.5,
                y: 10.0,
                width: 49.0,
                height: 30.0
            }
        );
    }

    #[test]
    fn long_text_in_narrow_box_ends_at_floor() {
        let engine = engine();
        let region = TextRegion::new("INTL DEP", 0.0, 0.0, 50.0, 54.0);
        assert_eq!(engine.initial_size(&region), 40);
        let spec = engine
            .typeset(&translated("INTERNATIONAL DEPARTURES", region))
            .expect("spec");
        assert_eq!(spec.font_size, FLOOR_SIZE);
        assert_eq!(
            spec.lines,
            vec!["INTERNATIONAL".to_string(), "DEPARTURES".to_string()]
        );
    }

    #[test]
    fn blank_translation_yields_nothing() {
        let region = TextRegion::new("CLOSED", 0.0, 0.0, 100.0, 30.0);
        assert!(engine().typeset(&translated("  \n ", region)).is_none());
    }

    #[test]
    fn initial_size_uses_per_line_height() {
        let engine = engine();
        let region = TextRegion::new("A\nB", 0.0, 0.0, 200.0, 80.0).with_line_count(2);
        assert_eq!(engine.initial_size(&region), 30);
        let tiny = TextRegion::new("a", 0.0, 0.0, 10.0, 4.0);
        assert_eq!(engine.initial_size(&tiny), 10);
    }

    #[test]
    fn paragraph_regions_wrap_to_fit_height() {
        let engine = engine();
        let region = TextRegion::new("src", 0.0, 0.0, 120.0, 60.0).with_line_count(2);
        let spec = engine
            .typeset(&translated("please keep this door closed at all times", region.clone()))
            .expect("spec");
        let total = spec.lines.len() as f32 * spec.font_size as f32 * 1.2;
        assert!(spec.lines.len() > 1);
        assert!(total <= region.height || spec.font_size == FLOOR_SIZE);
        for width in &spec.line_widths {
            assert!(*width <= region.width * 1.1 + 0.01);
        }
    }

    #[test]
    fn size_and_width_bounds_hold() {
        let engine = engine();
        let cases = [
            ("EXIT", TextRegion::new("x", 0.0, 0.0, 40.0, 20.0)),
            ("Emergency exit only", TextRegion::new("x", 5.0, 5.0, 90.0, 25.0)),
            ("出口はこちらです", TextRegion::new("x", 0.0, 0.0, 60.0, 40.0).with_line_count(2)),
            ("A", TextRegion::new("x", 0.0, 0.0, 300.0, 120.0)),
        ];
        for (text, region) in cases {
            let initial = engine.initial_size(&region);
            let spec = engine.typeset(&translated(text, region.clone())).expect("spec");
            assert!(spec.font_size >= FLOOR_SIZE && spec.font_size <= initial, "{}", text);
            if spec.font_size > FLOOR_SIZE {
                for width in &spec.line_widths {
                    assert!(*width <= region.width * 1.1 + 0.01, "{}", text);
                }
            }
        }
    }

    #[test]
    fn wrap_breaks_ideographs_per_character() {
        let lines = wrap_text("出口出口", 2.0, |part| part.chars().count() as f32);
        assert_eq!(lines, vec!["出口".to_string(), "出口".to_string()]);
    }

    #[test]
    fn wrap_honours_newlines_and_collapses_spaces() {
        let lines = wrap_text("open   now\nclosed", 100.0, |part| part.chars().count() as f32);
        assert_eq!(lines, vec!["open now".to_string(), "closed".to_string()]);
    }
}
