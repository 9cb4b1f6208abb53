use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CollaboratorError;
use crate::ocr::{TextRegion, TranslatedRegion};
use crate::providers::{TextTranslator, TranslationRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_CONCURRENCY: usize = 4;

/// Translates region text, falling back to the source text whenever the
/// collaborator cannot produce a translation.
#[derive(Debug, Clone)]
pub struct RegionTranslator<T> {
    translator: T,
    timeout: Duration,
    concurrency: usize,
}

impl<T: TextTranslator> RegionTranslator<T> {
    pub fn new(translator: T) -> Self {
        Self {
            translator,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn translate_text(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if !has_translatable_content(trimmed) {
            debug!("skipping translation of '{}': no letters", trimmed);
            return text.to_string();
        }
        let request = TranslationRequest {
            text: trimmed.to_string(),
            source_lang: normalize_source_lang(source_lang),
            target_lang: target_lang.trim().to_string(),
        };
        match self.call(request).await {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => {
                warn!("translation of '{}' came back empty; keeping source text", trimmed);
                text.to_string()
            }
            Err(err) => {
                warn!("translation of '{}' failed: {}; keeping source text", trimmed, err);
                text.to_string()
            }
        }
    }

    /// Translates every region, preserving input order. Identical texts are
    /// sent to the collaborator once.
    pub async fn translate_regions(
        &self,
        regions: Vec<TextRegion>,
        source_lang: &str,
        target_lang: &str,
    ) -> Vec<TranslatedRegion> {
        let mut seen = HashSet::new();
        let unique = regions
            .iter()
            .filter(|region| seen.insert(region.text.as_str()))
            .map(|region| region.text.clone())
            .collect::<Vec<_>>();
        debug!(
            "translating {} unique text(s) across {} region(s)",
            unique.len(),
            regions.len()
        );

        let translations: Vec<String> = stream::iter(unique.iter())
            .map(|text| self.translate_text(text, source_lang, target_lang))
            .buffered(self.concurrency)
            .collect()
            .await;
        let memo = unique
            .iter()
            .map(String::as_str)
            .zip(translations)
            .collect::<HashMap<_, _>>();

        regions
            .iter()
            .map(|region| TranslatedRegion {
                region: region.clone(),
                translated_text: memo.get(region.text.as_str()).cloned().unwrap_or_default(),
            })
            .collect()
    }

    async fn call(&self, request: TranslationRequest) -> Result<String, CollaboratorError> {
        tokio::time::timeout(self.timeout, self.translator.translate(request))
            .await
            .map_err(|_| CollaboratorError::Timeout(self.timeout))?
    }
}

/// Text without any letter (prices, numbers, symbols) is kept as-is.
pub fn has_translatable_content(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

fn normalize_source_lang(source_lang: &str) -> Option<String> {
    let trimmed = source_lang.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(trimmed.to_string())
    }
}
