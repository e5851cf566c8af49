//! Translation handlers.

use crate::schema::GetTranslationRequest;
use async_trait::async_trait;

/// Outcome of a translation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Translated { text: String },
    Failure { reason: String },
}

/// A translation engine the endpoint dispatches validated requests to.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &GetTranslationRequest) -> TranslationResult;
}

/// Placeholder translator that knows no language pair and always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubTranslator;

impl StubTranslator {
    /// Failure reason reported for a request.
    pub fn failure_reason(lang_from: &str, lang_to: &str, text: &str) -> String {
        format!(
            "I don't know how to translate from {} to {} the text '{}'",
            lang_from, lang_to, text
        )
    }
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(&self, request: &GetTranslationRequest) -> TranslationResult {
        TranslationResult::Failure {
            reason: Self::failure_reason(&request.lang_from, &request.lang_to, &request.text),
        }
    }
}
