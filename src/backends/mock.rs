/*!
 * Mock backend implementations for testing.
 *
 * Behaviors:
 * - `MockBackend::working()` - translates via a fixed lookup, falling back
 *   to a `[PT] ` prefix so outputs always differ from inputs
 * - `MockBackend::failing(error)` - always fails with the given error kind
 * - `MockBackend::flaky(n)` - fails the first n calls, then works
 *
 * No network I/O ever happens here.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{TranslationBackend, parse_numbered_response};
use crate::app_config::BackendKind;
use crate::errors::BackendError;
use crate::prompts::{Prompt, PromptPayload};

/// Which error a failing mock produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Timeout,
    Quota,
    Protocol,
}

impl MockFailure {
    fn to_error(self) -> BackendError {
        match self {
            Self::Unavailable => BackendError::Unavailable("mock refused".to_string()),
            Self::Timeout => BackendError::Timeout(Duration::from_secs(30)),
            Self::Quota => BackendError::QuotaExceeded("mock quota exhausted".to_string()),
            Self::Protocol => {
                BackendError::Protocol { status_code: 500, message: "mock blew up".to_string() }
            }
        }
    }
}

/// Configurable in-process backend for tests
pub struct MockBackend {
    kind: BackendKind,
    /// Exact-match translations, keyed by the source line
    responses: Mutex<HashMap<String, String>>,
    /// Raw replies consumed (FIFO) by upcoming single calls, before lookup
    script_queue: Mutex<Vec<String>>,
    /// Scripted reply for the next batch call (raw numbered text)
    batch_script: Mutex<Option<String>>,
    failure: Option<MockFailure>,
    fail_first: usize,
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MockBackend {
    /// Always succeeds
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            kind: BackendKind::LocalLlm,
            responses: Mutex::new(HashMap::new()),
            script_queue: Mutex::new(Vec::new()),
            batch_script: Mutex::new(None),
            failure: None,
            fail_first: 0,
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    /// Always fails with the given error
    pub fn failing(failure: MockFailure) -> Arc<Self> {
        Arc::new(Self {
            kind: BackendKind::LocalLlm,
            responses: Mutex::new(HashMap::new()),
            script_queue: Mutex::new(Vec::new()),
            batch_script: Mutex::new(None),
            failure: Some(failure),
            fail_first: usize::MAX,
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    /// Fails the first `n` calls with the given error, then works
    pub fn flaky(n: usize, failure: MockFailure) -> Arc<Self> {
        Arc::new(Self {
            kind: BackendKind::LocalLlm,
            responses: Mutex::new(HashMap::new()),
            script_queue: Mutex::new(Vec::new()),
            batch_script: Mutex::new(None),
            failure: Some(failure),
            fail_first: n,
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    /// Register an exact-match translation
    pub fn respond(&self, source: &str, translated: &str) {
        self.responses.lock().insert(source.to_string(), translated.to_string());
    }

    /// Queue a raw reply for an upcoming single call, served before the
    /// exact-match lookup (useful for pre-scan prompts)
    pub fn script_next(&self, raw_response: &str) {
        self.script_queue.lock().push(raw_response.to_string());
    }

    /// Script the raw text returned for the next batch call
    pub fn script_batch(&self, raw_response: &str) {
        *self.batch_script.lock() = Some(raw_response.to_string());
    }

    /// Number of single-line calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of batch calls made
    pub fn batch_call_count(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self, call_index: usize) -> Option<BackendError> {
        match self.failure {
            Some(failure) if call_index < self.fail_first => Some(failure.to_error()),
            _ => None,
        }
    }

    /// Pull the source line back out of whichever prompt shape was built
    fn source_text(prompt: &Prompt) -> String {
        match &prompt.payload {
            PromptPayload::Llm { user, .. } => {
                // The builder puts the text on the "{src}: {text}" line
                user.lines()
                    .rev()
                    .find_map(|line| line.split_once(": ").map(|(_, text)| text.to_string()))
                    .unwrap_or_else(|| user.clone())
            }
            PromptPayload::Deepl { text, .. } | PromptPayload::Plain { text } => {
                // Strip builder prefixes like "[Context: ...] " / "[Keep: ...] "
                match text.rsplit_once("] ") {
                    Some((_, bare)) if text.starts_with('[') => bare.to_string(),
                    _ => text.clone(),
                }
            }
        }
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn translate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.should_fail(index) {
            return Err(error);
        }

        {
            let mut queue = self.script_queue.lock();
            if !queue.is_empty() {
                return Ok(queue.remove(0));
            }
        }

        let source = Self::source_text(prompt);
        if let Some(translated) = self.responses.lock().get(&source) {
            return Ok(translated.clone());
        }
        Ok(format!("[PT] {}", source))
    }

    async fn translate_batch(
        &self,
        _prompt: &Prompt,
        expected: usize,
    ) -> Result<Option<Vec<Option<String>>>, BackendError> {
        let index = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.should_fail(index) {
            return Err(error);
        }

        match self.batch_script.lock().take() {
            Some(raw) => Ok(parse_numbered_response(&raw, expected)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TranslationJob;
    use crate::prompts::{PromptBuilder, TranslationProfile};

    fn prompt_for(text: &str) -> Prompt {
        let builder = PromptBuilder::new(TranslationProfile::default());
        let job = TranslationJob::new(TranslationProfile::default());
        builder.build(BackendKind::LocalLlm, text, &job, "en", "pt-BR")
    }

    #[tokio::test]
    async fn test_working_shouldUseRegisteredResponse() {
        let backend = MockBackend::working();
        backend.respond("Hello", "Olá");

        let result = backend.translate(&prompt_for("Hello")).await.unwrap();
        assert_eq!(result, "Olá");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_working_unknownText_shouldPrefix() {
        let backend = MockBackend::working();
        let result = backend.translate(&prompt_for("Mystery line")).await.unwrap();
        assert_eq!(result, "[PT] Mystery line");
    }

    #[tokio::test]
    async fn test_failing_shouldAlwaysError() {
        let backend = MockBackend::failing(MockFailure::Quota);
        let result = backend.translate(&prompt_for("Hello")).await;
        assert!(matches!(result, Err(BackendError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn test_flaky_shouldRecoverAfterNFailures() {
        let backend = MockBackend::flaky(2, MockFailure::Timeout);

        assert!(backend.translate(&prompt_for("One")).await.is_err());
        assert!(backend.translate(&prompt_for("Two")).await.is_err());
        assert!(backend.translate(&prompt_for("Three")).await.is_ok());
    }

    #[tokio::test]
    async fn test_scriptBatch_shouldParseNumberedReply() {
        let backend = MockBackend::working();
        backend.script_batch("1\u{2502} Um\n2\u{2502} Dois");

        let result = backend
            .translate_batch(&prompt_for("x"), 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result[0].as_deref(), Some("Um"));
        assert_eq!(result[1].as_deref(), Some("Dois"));

        // Script consumed: next batch call reports unparseable
        assert!(backend.translate_batch(&prompt_for("x"), 2).await.unwrap().is_none());
    }
}
