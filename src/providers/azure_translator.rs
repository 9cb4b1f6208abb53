use serde::Deserialize;
use serde_json::json;

use super::retry::send_with_backoff;
use super::{CollaboratorFuture, TextTranslator, TranslationRequest};
use crate::error::CollaboratorError;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";
const API_VERSION: &str = "3.0";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const REGION_HEADER: &str = "Ocp-Apim-Subscription-Region";

/// Azure AI Translator (text translation v3) client.
#[derive(Debug, Clone)]
pub struct AzureTranslator {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    region: Option<String>,
}

impl AzureTranslator {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            key: key.into(),
            region: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint.trim().trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn query(request: &TranslationRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("api-version", API_VERSION.to_string()),
            ("to", request.target_lang.clone()),
        ];
        if let Some(from) = request.source_lang.as_ref() {
            query.push(("from", from.clone()));
        }
        query
    }
}

impl TextTranslator for AzureTranslator {
    fn translate(&self, request: TranslationRequest) -> CollaboratorFuture<String> {
        let provider = self.clone();
        Box::pin(async move { translate_text(provider, request).await })
    }
}

async fn translate_text(
    provider: AzureTranslator,
    request: TranslationRequest,
) -> Result<String, CollaboratorError> {
    let url = format!("{}/translate", provider.endpoint);
    let query = AzureTranslator::query(&request);
    let body = json!([{ "Text": request.text }]);
    let response = send_with_backoff("translator", || {
        let mut builder = provider
            .client
            .post(&url)
            .query(&query)
            .header(KEY_HEADER, &provider.key)
            .json(&body);
        if let Some(region) = provider.region.as_ref() {
            builder = builder.header(REGION_HEADER, region);
        }
        builder
    })
    .await?;
    if !response.status.is_success() {
        return Err(CollaboratorError::Status {
            status: response.status.as_u16(),
            body: response.body,
        });
    }
    extract_translation(&response.body)
}

#[derive(Debug, Deserialize)]
struct TranslationItem {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

pub(crate) fn extract_translation(body: &str) -> Result<String, CollaboratorError> {
    let items: Vec<TranslationItem> = serde_json::from_str(body)
        .map_err(|err| CollaboratorError::Malformed(format!("translation: {}", err)))?;
    items
        .into_iter()
        .next()
        .and_then(|item| item.translations.into_iter().next())
        .map(|translation| translation.text)
        .ok_or(CollaboratorError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_translation() {
        let body = r#"[{"detectedLanguage":{"language":"en","score":1.0},"translations":[{"text":"닫힘","to":"ko"}]}]"#;
        assert_eq!(extract_translation(body).expect("translation"), "닫힘");
    }

    #[test]
    fn empty_translation_array_is_an_error() {
        assert!(matches!(
            extract_translation(r#"[{"translations":[]}]"#),
            Err(CollaboratorError::Empty)
        ));
        assert!(matches!(
            extract_translation("[]"),
            Err(CollaboratorError::Empty)
        ));
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(
            extract_translation("upstream connect error"),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn source_language_is_optional_in_query() {
        let mut request = TranslationRequest {
            text: "CLOSED".to_string(),
            source_lang: None,
            target_lang: "ko".to_string(),
        };
        assert_eq!(
            AzureTranslator::query(&request),
            vec![("api-version", "3.0".to_string()), ("to", "ko".to_string())]
        );
        request.source_lang = Some("en".to_string());
        assert_eq!(AzureTranslator::query(&request).last(), Some(&("from", "en".to_string())));
    }
}
