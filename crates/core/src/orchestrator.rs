use crate::chunking::{chunk_by_paragraph, ChunkingConfig, TokenMeasure};
use crate::client::ExtractionClient;
use crate::config::{ChunkFailurePolicy, PipelineOptions};
use crate::criteria::CriteriaSchema;
use crate::merge::merge_partials;
use crate::models::{
    ChunkFailure, ChunkFailureKind, DocumentReport, DocumentResultSet, DocumentSource,
    PartialResult,
};
use crate::traits::{CompletionTransport, PdfTextExtractor};
use crate::ExtractError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared cancellation signal, checked before each document and each chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type SharedMeasure = Arc<dyn TokenMeasure + Send + Sync>;

pub struct TenderAnalyzer<T, P>
where
    T: CompletionTransport,
    P: PdfTextExtractor,
{
    client: ExtractionClient<T>,
    pdf: P,
    criteria: Arc<CriteriaSchema>,
    options: PipelineOptions,
    measure: SharedMeasure,
    cancel: CancelFlag,
}

enum ChunkOutcome {
    Partial(PartialResult),
    Transport { chunk_index: usize, error: ExtractError },
}

impl<T, P> TenderAnalyzer<T, P>
where
    T: CompletionTransport,
    P: PdfTextExtractor,
{
    pub fn new(
        transport: T,
        pdf: P,
        criteria: Arc<CriteriaSchema>,
        options: PipelineOptions,
    ) -> Result<Self, ExtractError> {
        options.validate()?;
        let client = ExtractionClient::new(transport)
            .with_retry(options.retry)
            .with_timeout(options.llm_timeout());
        let measure: SharedMeasure = Arc::new(ChunkingConfig::from(&options).heuristic());

        Ok(Self {
            client,
            pdf,
            criteria,
            options,
            measure,
            cancel: CancelFlag::new(),
        })
    }

    /// Replaces the character heuristic, e.g. with a real tokenizer.
    pub fn with_measure(mut self, measure: impl TokenMeasure + Send + Sync + 'static) -> Self {
        self.measure = Arc::new(measure);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn criteria(&self) -> &CriteriaSchema {
        &self.criteria
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_by_paragraph(text, self.options.max_chunk_tokens, self.measure.as_ref())
    }

    pub async fn analyze(&self, source: &DocumentSource) -> Result<DocumentReport, ExtractError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let document = source.name();
        let text = self.pdf.extract_text(source).await?;
        info!(document = %document, chars = text.len(), "document text extracted");
        self.analyze_text(&document, &text).await
    }

    pub async fn analyze_text(&self, document: &str, text: &str) -> Result<DocumentReport, ExtractError> {
        self.analyze_text_with(document, text, &self.criteria).await
    }

    /// Runs the chunk-extract-merge pipeline with a caller-supplied schema.
    pub async fn analyze_text_with(
        &self,
        document: &str,
        text: &str,
        criteria: &CriteriaSchema,
    ) -> Result<DocumentReport, ExtractError> {
        let chunks = self.chunk(text);
        let chunk_count = chunks.len();
        info!(document = %document, chunk_count, "analyzing document");

        // Whitespace-only chunks carry nothing to extract.
        let outcomes = stream::iter(
            chunks
                .iter()
                .enumerate()
                .filter(|(_, chunk)| !chunk.trim().is_empty()),
        )
        .map(|(chunk_index, chunk)| self.extract_chunk(document, chunk_index, chunk, criteria))
        .buffered(self.options.chunk_concurrency);
        let mut outcomes = pin!(outcomes);

        let mut partials = Vec::with_capacity(chunk_count);
        let mut failures = Vec::new();
        let mut last_transport_error = None;

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ChunkOutcome::Partial(partial) => {
                    if let PartialResult::Unparsed {
                        chunk_index,
                        error,
                        raw,
                    } = &partial
                    {
                        failures.push(ChunkFailure {
                            chunk_index: *chunk_index,
                            kind: ChunkFailureKind::Unparsed,
                            message: error.clone(),
                            raw: Some(raw.clone()),
                        });
                    }
                    partials.push(partial);
                }
                ChunkOutcome::Transport { chunk_index, error } => {
                    let fatal = match &error {
                        ExtractError::Llm(llm) => llm.is_fatal(),
                        _ => true,
                    };
                    // Returning drops the stream, so no further chunk is sent.
                    if fatal || self.options.chunk_failure_policy == ChunkFailurePolicy::AbortDocument {
                        warn!(document = %document, chunk_index, %error, "aborting document");
                        return Err(error);
                    }

                    warn!(document = %document, chunk_index, %error, "chunk failed in transport");
                    failures.push(ChunkFailure {
                        chunk_index,
                        kind: ChunkFailureKind::Transport,
                        message: error.to_string(),
                        raw: None,
                    });
                    last_transport_error = Some(error);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        if partials.is_empty() {
            if let Some(error) = last_transport_error {
                return Err(ExtractError::AllChunksFailed {
                    document: document.to_string(),
                    failed: failures.len(),
                    last_error: error.to_string(),
                });
            }
        }

        let result = merge_partials(&partials);
        info!(
            document = %document,
            chunk_count,
            failed_chunks = failures.len(),
            conflicts = result.conflicts().len(),
            "document merged"
        );

        Ok(DocumentReport {
            document: document.to_string(),
            chunk_count,
            result,
            failures,
            analyzed_at: Utc::now(),
        })
    }

    async fn extract_chunk(
        &self,
        document: &str,
        chunk_index: usize,
        chunk: &str,
        criteria: &CriteriaSchema,
    ) -> ChunkOutcome {
        if self.cancel.is_cancelled() {
            return ChunkOutcome::Transport {
                chunk_index,
                error: ExtractError::Cancelled,
            };
        }

        debug!(document = %document, chunk_index, chars = chunk.len(), "chunk queued");
        match self.client.extract(chunk_index, chunk, criteria).await {
            Ok(partial) => ChunkOutcome::Partial(partial),
            Err(error) => ChunkOutcome::Transport { chunk_index, error },
        }
    }

    /// Analyzes every source independently; one document's failure is recorded
    /// in its own entry and never affects the others.
    pub async fn analyze_batch(&self, sources: Vec<DocumentSource>) -> DocumentResultSet {
        let mut results = DocumentResultSet::new();
        let mut keys = Vec::with_capacity(sources.len());
        for source in &sources {
            let key = results.reserve_key(source.name(), || match source.path() {
                Some(path) => path.display().to_string(),
                None => source.name(),
            });
            results.insert(key.clone(), Err(ExtractError::Cancelled.to_string()));
            keys.push(key);
        }

        info!(documents = sources.len(), "starting batch");

        let outcomes: Vec<_> = stream::iter(sources.iter())
            .map(|source| self.analyze(source))
            .buffered(self.options.document_concurrency)
            .collect()
            .await;

        for (key, outcome) in keys.into_iter().zip(outcomes) {
            let outcome = outcome.map_err(|error| {
                warn!(document = %key, %error, "document failed");
                error.to_string()
            });
            results.insert(key, outcome);
        }

        info!(
            documents = results.len(),
            succeeded = results.succeeded(),
            "batch finished"
        );
        results
    }
}
