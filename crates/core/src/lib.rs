pub mod chunking;
pub mod client;
pub mod config;
pub mod criteria;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod traits;
pub mod transports;

pub use chunking::{
    chunk_by_paragraph, chunk_text, CharHeuristic, ChunkingConfig, TokenMeasure,
    PARAGRAPH_SEPARATOR,
};
pub use client::{parse_response, ExtractionClient};
pub use config::{ChunkFailurePolicy, PipelineOptions, RetryPolicy};
pub use criteria::{CriteriaNode, CriteriaSchema};
pub use error::{ExtractError, LlmError};
pub use extractor::{extract_page_texts, join_pages, LopdfExtractor, PageText};
pub use ingest::{collect_sources, discover_pdf_files};
pub use merge::{
    merge_partials, Candidate, DisplacedValues, FieldConflict, MergedField, MergedNode,
    MergedResult,
};
pub use models::{
    ChunkFailure, ChunkFailureKind, DocumentOutcome, DocumentReport, DocumentResultSet,
    DocumentSource, ExtractionNode, ExtractionTree, FieldValue, PartialResult, NOT_FOUND_SENTINEL,
};
pub use orchestrator::{CancelFlag, TenderAnalyzer};
pub use prompt::build_prompt;
pub use traits::{CompletionTransport, PdfTextExtractor};
pub use transports::{GeminiTransport, API_KEY_ENV, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL};
