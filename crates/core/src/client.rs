//! Per-chunk extraction: prompt, call, parse.

use crate::config::RetryPolicy;
use crate::criteria::CriteriaSchema;
use crate::error::{ExtractError, LlmError};
use crate::models::PartialResult;
use crate::prompt::build_prompt;
use crate::traits::CompletionTransport;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExtractionClient<T> {
    transport: T,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl<T> ExtractionClient<T>
where
    T: CompletionTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Extracts one chunk. Parse failures come back as
    /// [`PartialResult::Unparsed`]; only transport failures are errors.
    pub async fn extract(
        &self,
        chunk_index: usize,
        chunk: &str,
        criteria: &CriteriaSchema,
    ) -> Result<PartialResult, ExtractError> {
        let prompt = build_prompt(chunk, criteria)?;
        debug!(chunk_index, prompt_chars = prompt.len(), "extracting chunk");

        let raw = self.complete_with_retry(chunk_index, &prompt).await?;
        debug!(chunk_index, response_chars = raw.len(), "llm responded");

        let partial = parse_response(chunk_index, &raw);
        if let PartialResult::Unparsed { error, .. } = &partial {
            warn!(chunk_index, %error, "llm response was not usable JSON");
        }
        Ok(partial)
    }

    async fn complete_with_retry(&self, chunk_index: usize, prompt: &str) -> Result<String, LlmError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match self.complete_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => error,
            };

            attempt += 1;
            if attempt >= attempts || !error.is_retryable() {
                return Err(error);
            }

            let delay = self.retry.backoff(attempt - 1);
            warn!(
                chunk_index,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "llm call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, LlmError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.complete(prompt))
                .await
                .map_err(|_| LlmError::Timeout(limit))?,
            None => self.transport.complete(prompt).await,
        }
    }
}

// Text before the first `{` and after the first complete value is ignored.
pub fn parse_response(chunk_index: usize, raw: &str) -> PartialResult {
    let unparsed = |error: String| PartialResult::Unparsed {
        chunk_index,
        error,
        raw: raw.to_string(),
    };

    let Some(start) = raw.find('{') else {
        return unparsed("no JSON object in response".to_string());
    };

    let mut values = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => match PartialResult::from_value(chunk_index, &value) {
            PartialResult::Unparsed { error, .. } => unparsed(error),
            extracted => extracted,
        },
        Some(Err(error)) => unparsed(error.to_string()),
        None => unparsed("empty response".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionNode, FieldValue};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.lock().expect("calls lock").push(prompt.to_string());
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Response("script exhausted".to_string())))
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn parses_json_after_commentary() {
        let raw = "Sure! Here is the extraction:\n{\"specific_criteria\": {\"turnover\": \"10 Crore\"}}";
        let PartialResult::Extracted { tree, chunk_index } = parse_response(4, raw) else {
            panic!("should parse");
        };
        assert_eq!(chunk_index, 4);
        let Some(ExtractionNode::Group(group)) = tree.get("specific_criteria") else {
            panic!("group expected");
        };
        assert_eq!(
            group.get("turnover"),
            Some(&ExtractionNode::Field(FieldValue::Found(json!("10 Crore"))))
        );
    }

    #[test]
    fn tolerates_code_fences() {
        let raw = "```json\n{\"a\": \"b\"}\n```";
        assert!(matches!(parse_response(0, raw), PartialResult::Extracted { .. }));
    }

    #[test]
    fn keeps_raw_text_when_parsing_fails() {
        let raw = "I could not find anything { not json";
        match parse_response(2, raw) {
            PartialResult::Unparsed { chunk_index, error, raw: kept } => {
                assert_eq!(chunk_index, 2);
                assert!(!error.is_empty());
                assert_eq!(kept, raw);
            }
            other => panic!("expected unparsed, got {other:?}"),
        }

        assert!(matches!(
            parse_response(0, "no braces at all"),
            PartialResult::Unparsed { .. }
        ));
    }

    #[tokio::test]
    async fn one_call_per_chunk_on_success() {
        let transport = ScriptedTransport::new(vec![Ok("{\"a\": \"1\"}".to_string())]);
        let client = ExtractionClient::new(transport).with_retry(quick_retry(3));

        let result = client
            .extract(0, "chunk text", &CriteriaSchema::tender_default())
            .await
            .expect("extract");

        assert!(matches!(result, PartialResult::Extracted { .. }));
        assert_eq!(client.transport().call_count(), 1);
        let prompt = &client.transport().calls.lock().expect("calls lock")[0];
        assert!(prompt.contains("chunk text"));
    }

    #[tokio::test]
    async fn unparsable_reply_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok("garbage".to_string())]);
        let client = ExtractionClient::new(transport).with_retry(quick_retry(3));

        let result = client
            .extract(0, "chunk", &CriteriaSchema::tender_default())
            .await
            .expect("parse failures are data");

        assert!(matches!(result, PartialResult::Unparsed { .. }));
        assert_eq!(client.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(LlmError::RateLimited("slow".to_string())),
            Err(LlmError::Api {
                status: 502,
                body: String::new(),
            }),
            Ok("{\"a\": \"1\"}".to_string()),
        ]);
        let client = ExtractionClient::new(transport).with_retry(quick_retry(3));

        let result = client
            .extract(0, "chunk", &CriteriaSchema::tender_default())
            .await
            .expect("third attempt succeeds");

        assert!(matches!(result, PartialResult::Extracted { .. }));
        assert_eq!(client.transport().call_count(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let transport = ScriptedTransport::new(vec![
            Err(LlmError::RateLimited("1".to_string())),
            Err(LlmError::RateLimited("2".to_string())),
            Err(LlmError::RateLimited("3".to_string())),
        ]);
        let client = ExtractionClient::new(transport).with_retry(quick_retry(2));

        let result = client.extract(0, "chunk", &CriteriaSchema::tender_default()).await;

        assert!(matches!(
            result,
            Err(ExtractError::Llm(LlmError::RateLimited(ref body))) if body == "2"
        ));
        assert_eq!(client.transport().call_count(), 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(LlmError::MissingCredential(
            "GEMINI_API_KEY".to_string(),
        ))]);
        let client = ExtractionClient::new(transport).with_retry(quick_retry(5));

        let result = client.extract(0, "chunk", &CriteriaSchema::tender_default()).await;
        assert!(matches!(
            result,
            Err(ExtractError::Llm(LlmError::MissingCredential(_)))
        ));
        assert_eq!(client.transport().call_count(), 1);
    }

    struct SlowTransport;

    #[async_trait]
    impl CompletionTransport for SlowTransport {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let client = ExtractionClient::new(SlowTransport)
            .with_retry(RetryPolicy::none())
            .with_timeout(Some(Duration::from_millis(20)));

        let result = client.extract(0, "chunk", &CriteriaSchema::tender_default()).await;
        assert!(matches!(result, Err(ExtractError::Llm(LlmError::Timeout(_)))));
    }
}
