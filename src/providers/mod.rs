use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::CollaboratorError;
use crate::ocr::LayoutDocument;

mod azure_layout;
mod azure_translator;
mod retry;

pub use azure_layout::AzureDocumentIntelligence;
pub use azure_translator::AzureTranslator;

pub type CollaboratorFuture<T> = Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    /// `None` lets the collaborator detect the source language.
    pub source_lang: Option<String>,
    pub target_lang: String,
}

/// OCR / layout analysis collaborator.
pub trait LayoutAnalyzer: Send + Sync {
    fn analyze(&self, image: Vec<u8>) -> CollaboratorFuture<LayoutDocument>;
}

/// Text translation collaborator.
pub trait TextTranslator: Send + Sync {
    fn translate(&self, request: TranslationRequest) -> CollaboratorFuture<String>;
}

impl<T: LayoutAnalyzer + ?Sized> LayoutAnalyzer for Arc<T> {
    fn analyze(&self, image: Vec<u8>) -> CollaboratorFuture<LayoutDocument> {
        (**self).analyze(image)
    }
}

impl<T: TextTranslator + ?Sized> TextTranslator for Arc<T> {
    fn translate(&self, request: TranslationRequest) -> CollaboratorFuture<String> {
        (**self).translate(request)
    }
}
