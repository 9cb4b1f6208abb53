use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::geom::{bounding_rect, center, contains};
use super::{LayoutDocument, TextRegion, TextUnit};
use crate::error::CollaboratorError;
use crate::providers::LayoutAnalyzer;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Groups layout units into the regions the rest of the pipeline works on.
pub trait RegionExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn regions(&self, document: &LayoutDocument) -> Vec<TextRegion>;
}

/// One region per recognised line. Suited to menus and tabular signs where
/// paragraph grouping would merge unrelated columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineStrategy;

/// One region per recognised paragraph, covering every line in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphStrategy;

impl RegionExtractionStrategy for LineStrategy {
    fn name(&self) -> &'static str {
        "line"
    }

    fn regions(&self, document: &LayoutDocument) -> Vec<TextRegion> {
        document
            .lines
            .iter()
            .filter_map(|unit| region_from_unit(unit, 1))
            .collect()
    }
}

impl RegionExtractionStrategy for ParagraphStrategy {
    fn name(&self) -> &'static str {
        "paragraph"
    }

    fn regions(&self, document: &LayoutDocument) -> Vec<TextRegion> {
        if document.paragraphs.is_empty() {
            debug!("layout has no paragraphs");
            return Vec::new();
        }
        document
            .paragraphs
            .iter()
            .filter_map(|unit| {
                let region = region_from_unit(unit, 1)?;
                let line_count = paragraph_line_count(&region, &unit.text, document);
                Some(region.with_line_count(line_count))
            })
            .collect()
    }
}

fn region_from_unit(unit: &TextUnit, line_count: usize) -> Option<TextRegion> {
    let text = unit.text.trim();
    if text.is_empty() || unit.polygon.len() < 3 {
        return None;
    }
    let rect = bounding_rect(&unit.polygon)?;
    Some(
        TextRegion::new(text, rect.x, rect.y, rect.width, rect.height).with_line_count(line_count),
    )
}

fn paragraph_line_count(region: &TextRegion, text: &str, document: &LayoutDocument) -> usize {
    let explicit = text.lines().filter(|line| !line.trim().is_empty()).count();
    let bounds = region.rect();
    let mut inside = document
        .lines
        .iter()
        .filter_map(|line| bounding_rect(&line.polygon))
        .filter(|rect| contains(&bounds, &center(rect)))
        .collect::<Vec<_>>();
    inside.sort_by(|a, b| center(a).y.total_cmp(&center(b).y));

    // Lines sharing a baseline (side-by-side columns) count as one row.
    let mut rows = 0usize;
    let mut last_row: Option<(f32, f32)> = None;
    for rect in inside {
        let center_y = center(&rect).y;
        match last_row {
            Some((row_y, row_h)) if (center_y - row_y).abs() <= row_h * 0.5 => {}
            _ => {
                rows += 1;
                last_row = Some((center_y, rect.height));
            }
        }
    }
    explicit.max(rows).max(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionGranularity {
    #[default]
    Line,
    Paragraph,
}

impl ExtractionGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionGranularity::Line => "line",
            ExtractionGranularity::Paragraph => "paragraph",
        }
    }

    pub fn strategy(&self) -> Box<dyn RegionExtractionStrategy> {
        match self {
            ExtractionGranularity::Line => Box::new(LineStrategy),
            ExtractionGranularity::Paragraph => Box::new(ParagraphStrategy),
        }
    }
}

impl FromStr for ExtractionGranularity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line" | "lines" => Ok(ExtractionGranularity::Line),
            "paragraph" | "paragraphs" => Ok(ExtractionGranularity::Paragraph),
            other => Err(format!(
                "unknown granularity '{}' (expected line or paragraph)",
                other
            )),
        }
    }
}

/// Runs the layout collaborator and reduces its output to regions.
pub struct TextRegionExtractor<L> {
    analyzer: L,
    strategy: Box<dyn RegionExtractionStrategy>,
    timeout: Duration,
}

impl<L: LayoutAnalyzer> TextRegionExtractor<L> {
    pub fn new(analyzer: L, strategy: Box<dyn RegionExtractionStrategy>) -> Self {
        Self {
            analyzer,
            strategy,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn extract(&self, image: Vec<u8>) -> Result<Vec<TextRegion>, CollaboratorError> {
        let document = tokio::time::timeout(self.timeout, self.analyzer.analyze(image))
            .await
            .map_err(|_| CollaboratorError::Timeout(self.timeout))??;
        let regions = self.strategy.regions(&document);
        debug!(
            "{} strategy produced {} region(s) from {} line(s) / {} paragraph(s)",
            self.strategy.name(),
            regions.len(),
            document.lines.len(),
            document.paragraphs.len()
        );
        Ok(regions)
    }
}
