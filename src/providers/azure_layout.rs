use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::retry::send_with_backoff;
use super::{CollaboratorFuture, LayoutAnalyzer};
use crate::error::CollaboratorError;
use crate::ocr::{LayoutDocument, TextUnit, polygon_from_flat};

const API_VERSION: &str = "2024-11-30";
pub(crate) const DEFAULT_MODEL: &str = "prebuilt-read";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS: usize = 240;

/// Azure Document Intelligence client for the `prebuilt-read` layout model.
#[derive(Debug, Clone)]
pub struct AzureDocumentIntelligence {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    model: String,
}

impl AzureDocumentIntelligence {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model, API_VERSION
        )
    }
}

impl LayoutAnalyzer for AzureDocumentIntelligence {
    fn analyze(&self, image: Vec<u8>) -> CollaboratorFuture<LayoutDocument> {
        let provider = self.clone();
        Box::pin(async move { analyze_document(provider, image).await })
    }
}

async fn analyze_document(
    provider: AzureDocumentIntelligence,
    image: Vec<u8>,
) -> Result<LayoutDocument, CollaboratorError> {
    let url = provider.analyze_url();
    let submitted = send_with_backoff("document-intelligence", || {
        provider
            .client
            .post(&url)
            .header(KEY_HEADER, &provider.key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.clone())
    })
    .await?;
    if submitted.status != StatusCode::ACCEPTED {
        return Err(CollaboratorError::Status {
            status: submitted.status.as_u16(),
            body: submitted.body,
        });
    }
    let operation_url = submitted
        .headers
        .get("operation-location")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .ok_or_else(|| CollaboratorError::Malformed("missing Operation-Location header".into()))?;
    debug!("document analysis accepted: {}", operation_url);

    for _ in 0..MAX_POLLS {
        let polled = send_with_backoff("document-intelligence", || {
            provider
                .client
                .get(&operation_url)
                .header(KEY_HEADER, &provider.key)
        })
        .await?;
        if !polled.status.is_success() {
            return Err(CollaboratorError::Status {
                status: polled.status.as_u16(),
                body: polled.body,
            });
        }
        match parse_operation(&polled.body)? {
            OperationState::Running => sleep(POLL_INTERVAL).await,
            OperationState::Succeeded(document) => return Ok(document),
            OperationState::Failed(message) => return Err(CollaboratorError::Failed(message)),
        }
    }
    Err(CollaboratorError::Failed(format!(
        "document analysis did not finish after {} polls",
        MAX_POLLS
    )))
}

#[derive(Debug)]
pub(crate) enum OperationState {
    Running,
    Succeeded(LayoutDocument),
    Failed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Page {
    width: Option<f32>,
    height: Option<f32>,
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    content: String,
    #[serde(default)]
    polygon: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paragraph {
    content: String,
    #[serde(default)]
    bounding_regions: Vec<BoundingRegion>,
}

#[derive(Debug, Deserialize)]
struct BoundingRegion {
    #[serde(default)]
    polygon: Vec<f32>,
}

pub(crate) fn parse_operation(body: &str) -> Result<OperationState, CollaboratorError> {
    let operation: AnalyzeOperation = serde_json::from_str(body)
        .map_err(|err| CollaboratorError::Malformed(format!("analyze operation: {}", err)))?;
    match operation.status.to_ascii_lowercase().as_str() {
        "notstarted" | "running" => Ok(OperationState::Running),
        "succeeded" => {
            let result = operation.analyze_result.ok_or_else(|| {
                CollaboratorError::Malformed("succeeded without analyzeResult".into())
            })?;
            Ok(OperationState::Succeeded(into_document(result)))
        }
        "failed" | "canceled" => {
            let message = operation
                .error
                .map(|err| {
                    format!(
                        "{}: {}",
                        err.code.unwrap_or_else(|| "unknown".to_string()),
                        err.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| format!("analysis {}", operation.status));
            Ok(OperationState::Failed(message))
        }
        other => Err(CollaboratorError::Malformed(format!(
            "unknown operation status '{}'",
            other
        ))),
    }
}

fn into_document(result: AnalyzeResult) -> LayoutDocument {
    let mut document = LayoutDocument::default();
    if let Some(first) = result.pages.first() {
        document.width = first.width;
        document.height = first.height;
    }
    for page in result.pages {
        for line in page.lines {
            document
                .lines
                .push(TextUnit::new(line.content, polygon_from_flat(&line.polygon)));
        }
    }
    for paragraph in result.paragraphs {
        let polygon = paragraph
            .bounding_regions
            .into_iter()
            .next()
            .map(|region| polygon_from_flat(&region.polygon))
            .unwrap_or_default();
        document
            .paragraphs
            .push(TextUnit::new(paragraph.content, polygon));
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{LineStrategy, ParagraphStrategy, RegionExtractionStrategy, TextRegion};

    const SUCCEEDED: &str = r#"{
        "status": "succeeded",
        "analyzeResult": {
            "pages": [{
                "pageNumber": 1, "width": 640, "height": 480, "unit": "pixel",
                "lines": [
                    {"content": "CLOSED", "polygon": [10, 10, 130, 10, 130, 40, 10, 40]},
                    {"content": "Open 9-5", "polygon": [12, 60, 110, 62, 108, 80, 10, 78]},
                    {"content": "Sat-Sun", "polygon": [10, 84, 90, 84, 90, 100, 10, 100]}
                ]
            }],
            "paragraphs": [
                {"content": "CLOSED", "boundingRegions": [{"pageNumber": 1, "polygon": [10, 10, 130, 10, 130, 40, 10, 40]}]},
                {"content": "Open 9-5 Sat-Sun", "boundingRegions": [{"pageNumber": 1, "polygon": [10, 60, 110, 60, 110, 100, 10, 100]}]}
            ]
        }
    }"#;

    fn summarize(regions: &[TextRegion]) -> String {
        regions
            .iter()
            .map(|region| {
                format!(
                    "{} @ ({}, {}) {}x{} lines={}",
                    region.text,
                    region.x,
                    region.y,
                    region.width,
                    region.height,
                    region.line_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn succeeded_document() -> LayoutDocument {
        match parse_operation(SUCCEEDED).expect("parse") {
            OperationState::Succeeded(document) => document,
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn line_regions_from_analyze_result() {
        let regions = LineStrategy.regions(&succeeded_document());
        insta::assert_snapshot!(summarize(&regions), @r###"
        CLOSED @ (10, 10) 120x30 lines=1
        Open 9-5 @ (10, 60) 100x20 lines=1
        Sat-Sun @ (10, 84) 80x16 lines=1
        "###);
    }

    #[test]
    fn paragraph_regions_from_analyze_result() {
        let regions = ParagraphStrategy.regions(&succeeded_document());
        insta::assert_snapshot!(summarize(&regions), @r###"
        CLOSED @ (10, 10) 120x30 lines=1
        Open 9-5 Sat-Sun @ (10, 60) 100x40 lines=2
        "###);
    }

    #[test]
    fn page_size_is_taken_from_first_page() {
        let document = succeeded_document();
        assert_eq!(document.width, Some(640.0));
        assert_eq!(document.height, Some(480.0));
    }

    #[test]
    fn running_and_failed_states() {
        assert!(matches!(
            parse_operation(r#"{"status":"running"}"#),
            Ok(OperationState::Running)
        ));
        match parse_operation(
            r#"{"status":"failed","error":{"code":"InvalidContent","message":"corrupted"}}"#,
        ) {
            Ok(OperationState::Failed(message)) => {
                assert_eq!(message, "InvalidContent: corrupted")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            parse_operation("<html>"),
            Err(CollaboratorError::Malformed(_))
        ));
        assert!(matches!(
            parse_operation(r#"{"status":"succeeded"}"#),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn analyze_url_trims_trailing_slash() {
        let client = AzureDocumentIntelligence::new("https://example.cognitiveservices.azure.com/", "k");
        assert_eq!(
            client.analyze_url(),
            "https://example.cognitiveservices.azure.com/documentintelligence/documentModels/prebuilt-read:analyze?api-version=2024-11-30"
        );
    }
}
