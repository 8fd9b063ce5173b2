use crate::{DocumentSource, ExtractError, LlmError};
use async_trait::async_trait;
use std::sync::Arc;

/// A text-completion backend: one prompt in, one raw completion out.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Turns a PDF into its text, pages joined by newlines.
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    async fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractError>;
}

#[async_trait]
impl<T> CompletionTransport for Arc<T>
where
    T: CompletionTransport + ?Sized,
{
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.as_ref().complete(prompt).await
    }
}

#[async_trait]
impl<P> PdfTextExtractor for Arc<P>
where
    P: PdfTextExtractor + ?Sized,
{
    async fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractError> {
        self.as_ref().extract_text(source).await
    }
}
