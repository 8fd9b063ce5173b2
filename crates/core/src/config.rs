//! Pipeline configuration.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailurePolicy {
    #[default]
    Isolate,
    AbortDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Token budget per chunk, estimated as characters / `chars_per_token`.
    pub max_chunk_tokens: usize,
    pub chars_per_token: usize,
    pub document_concurrency: usize,
    pub chunk_concurrency: usize,
    /// Per-call limit; zero disables the timeout.
    pub llm_timeout_secs: u64,
    pub chunk_failure_policy: ChunkFailurePolicy,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 2_000,
            chars_per_token: 4,
            document_concurrency: 4,
            chunk_concurrency: 1,
            llm_timeout_secs: 120,
            chunk_failure_policy: ChunkFailurePolicy::Isolate,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineOptions {
    pub fn llm_timeout(&self) -> Option<Duration> {
        (self.llm_timeout_secs > 0).then(|| Duration::from_secs(self.llm_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.max_chunk_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_chunk_tokens must be greater than 0".to_string(),
            ));
        }
        if self.chars_per_token == 0 {
            return Err(ExtractError::InvalidConfig(
                "chars_per_token must be greater than 0".to_string(),
            ));
        }
        if self.document_concurrency == 0 || self.chunk_concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "concurrency limits must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ExtractError::InvalidConfig(
                "retry.initial_backoff_ms cannot exceed retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml(raw: &str) -> Result<Self, ExtractError> {
        let options: Self = toml::from_str(raw)
            .map_err(|error| ExtractError::InvalidConfig(format!("failed to parse TOML: {error}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_toml(&self) -> Result<String, ExtractError> {
        toml::to_string_pretty(self)
            .map_err(|error| ExtractError::InvalidConfig(format!("failed to render TOML: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(PipelineOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let options = PipelineOptions {
            max_chunk_tokens: 0,
            ..PipelineOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let options = PipelineOptions::from_toml(
            "max_chunk_tokens = 500\nchunk_failure_policy = \"abort_document\"\n\n[retry]\nmax_attempts = 5\n",
        )
        .expect("toml should parse");

        assert_eq!(options.max_chunk_tokens, 500);
        assert_eq!(options.chars_per_token, 4);
        assert_eq!(options.chunk_failure_policy, ChunkFailurePolicy::AbortDocument);
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn toml_output_parses_back() {
        let options = PipelineOptions::default();
        let rendered = options.to_toml().expect("toml should render");
        assert_eq!(PipelineOptions::from_toml(&rendered).expect("toml should parse"), options);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
        assert_eq!(retry.backoff(4), Duration::from_millis(1_000));
        assert_eq!(retry.backoff(70), Duration::from_millis(1_000));
    }
}
