//! Cached, rate-limit-aware completion client.
//!
//! `complete` consults the [`CompletionCache`] first. A hit returns the stored
//! artifact with no provider call and no history record. A miss calls the
//! provider inside a bounded retry loop:
//!
//! - rate-limit errors sleep (provider-suggested delay, or
//!   `base_delay * 2^attempt`) and retry, except after the final attempt
//! - any other error ends the loop at once
//!
//! Every call that reaches the provider appends exactly one
//! [`CompletionRecord`]. Successful artifacts are written back to the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use pagebot_core::{CompletionRequest, CompletionResponse};
use pagebot_store::CompletionCache;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fingerprint::fingerprint;
use crate::history::{CompletionHistory, CompletionRecord};
use crate::pricing::Pricing;
use crate::provider::CompletionProvider;

/// Terminal outcome when no completion could be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionFailure {
    #[error("rate limited on all {attempts} attempts; last error: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("could not fingerprint request: {0}")]
    Fingerprint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Fallback delay after the 0-indexed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Suspends the caller between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    cache: Arc<dyn CompletionCache>,
    history: CompletionHistory,
    pricing: Pricing,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, cache: Arc<dyn CompletionCache>) -> Self {
        Self {
            provider,
            cache,
            history: CompletionHistory::new(),
            pricing: Pricing::default(),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn history(&self) -> &CompletionHistory {
        &self.history
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionFailure> {
        let fp = fingerprint(request).map_err(|e| CompletionFailure::Fingerprint(e.to_string()))?;

        match self.cache.get(&fp) {
            Ok(Some(cached)) => {
                info!(fingerprint = %fp, "completion cache hit");
                return Ok(cached);
            }
            Ok(None) => info!(fingerprint = %fp, "completion cache miss"),
            Err(e) => warn!(fingerprint = %fp, error = %e, "cache read failed, calling provider"),
        }

        let timestamp = Utc::now();
        let started = Instant::now();
        let outcome = self.call_with_retry(request).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        let mut record = CompletionRecord {
            timestamp,
            model: request.model.clone(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            response_id: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_dollars: 0.0,
            duration_seconds,
        };

        if let Ok(response) = &outcome {
            record.response_id = Some(response.id.clone());
            match &response.usage {
                Some(usage) => {
                    record.prompt_tokens = usage.prompt_tokens;
                    record.completion_tokens = usage.completion_tokens;
                }
                None => warn!(model = %request.model, "completion response missing usage data"),
            }
            record.cost_dollars = match self.pricing.cost(&response.model, response.usage.as_ref())
            {
                Ok(cost) => cost,
                Err(e) => {
                    warn!(model = %response.model, error = %e, "could not calculate completion cost");
                    0.0
                }
            };
            info!(
                cost_dollars = record.cost_dollars,
                prompt_tokens = record.prompt_tokens,
                completion_tokens = record.completion_tokens,
                "completion usage"
            );
        }

        self.history.record(record);

        if let Ok(response) = &outcome {
            match self.cache.put(&fp, response) {
                Ok(()) => info!(fingerprint = %fp, "saved completion to cache"),
                Err(e) => error!(fingerprint = %fp, error = %e, "failed to save completion to cache"),
            }
        }

        outcome
    }

    async fn call_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionFailure> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            debug!(
                model = %request.model,
                attempt = attempt + 1,
                max_attempts,
                "calling completion provider"
            );
            match self.provider.complete(request).await {
                Ok(response) => {
                    debug!(model = %request.model, attempt = attempt + 1, "completion succeeded");
                    return Ok(response);
                }
                Err(err) if err.is_rate_limit() => {
                    warn!(
                        model = %request.model,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "rate limited by provider"
                    );
                    if attempt + 1 >= max_attempts {
                        error!(
                            model = %request.model,
                            max_attempts,
                            "max retries reached due to rate limiting"
                        );
                        return Err(CompletionFailure::Exhausted {
                            attempts: max_attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = match err.suggested_delay() {
                        Some(delay) => {
                            info!(model = %request.model, delay_secs = delay.as_secs(), "retrying after provider-specified delay");
                            delay
                        }
                        None => {
                            let delay = self.retry.backoff(attempt);
                            info!(model = %request.model, delay_secs = delay.as_secs(), "retrying with exponential backoff");
                            delay
                        }
                    };
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        model = %request.model,
                        attempt = attempt + 1,
                        error = %err,
                        "non-retryable provider error"
                    );
                    return Err(CompletionFailure::Provider(err.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, RETRY_INFO_TYPE};
    use pagebot_core::{Fingerprint, Message, Usage};
    use pagebot_store::{FileCache, MemoryCache, StoreError};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider replaying a scripted sequence of results.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<CompletionResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    struct UnwritableCache;

    impl CompletionCache for UnwritableCache {
        fn get(&self, _: &Fingerprint) -> Result<Option<CompletionResponse>, StoreError> {
            Ok(None)
        }
        fn put(&self, _: &Fingerprint, _: &CompletionResponse) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn ok(content: &str) -> Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            id: "resp-1".into(),
            model: "gemini-2.5-flash".into(),
            content: content.into(),
            usage: Some(Usage {
                prompt_tokens: 1000,
                completion_tokens: 200,
                total_tokens: 1200,
            }),
        })
    }

    fn rate_limited(payload: Option<serde_json::Value>) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::RateLimited {
            message: "429 Too Many Requests".into(),
            payload,
        })
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("gemini-2.5-flash", vec![Message::user("extract")])
            .with_option("temperature", json!(0))
    }

    fn client(
        provider: Arc<ScriptedProvider>,
        cache: Arc<dyn CompletionCache>,
        sleeper: Arc<RecordingSleeper>,
    ) -> CompletionClient {
        CompletionClient::new(provider, cache).with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_and_history() {
        let cache = Arc::new(MemoryCache::new());
        let fp = fingerprint(&request()).unwrap();
        cache.put(&fp, &ok("cached").unwrap()).unwrap();

        let provider = ScriptedProvider::new(vec![ok("fresh")]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(provider.clone(), cache, sleeper.clone());

        let resp = client.complete(&request()).await.unwrap();
        assert_eq!(resp.content, "cached");
        assert_eq!(provider.calls(), 0);
        assert!(client.history().is_empty());
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn miss_calls_provider_then_caches() {
        let cache = Arc::new(MemoryCache::new());
        let provider = ScriptedProvider::new(vec![ok("fresh")]);
        let client = client(
            provider.clone(),
            cache.clone(),
            Arc::new(RecordingSleeper::default()),
        );

        let first = client.complete(&request()).await.unwrap();
        let second = client.complete(&request()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.len(), 1);

        let records = client.history().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].prompt_tokens, 1000);
        assert_eq!(records[0].completion_tokens, 200);
        assert_eq!(records[0].response_id.as_deref(), Some("resp-1"));
        // 1000 * 0.30 + 200 * 2.50 per million tokens
        assert!((records[0].cost_dollars - 0.0008).abs() < 1e-12);
    }

    #[tokio::test]
    async fn exponential_backoff_without_hint() {
        let provider =
            ScriptedProvider::new(vec![rate_limited(None), rate_limited(None), rate_limited(None)]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let cache = Arc::new(MemoryCache::new());
        let client = client(provider.clone(), cache.clone(), sleeper.clone());

        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionFailure::Exhausted { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
        // No sleep after the final attempt.
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert!(cache.is_empty());

        let records = client.history().records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert!(records[0].error.as_deref().unwrap().contains("429"));
        assert_eq!(records[0].cost_dollars, 0.0);
    }

    #[tokio::test]
    async fn backoff_scales_with_base_delay() {
        let provider = ScriptedProvider::new(vec![
            rate_limited(None),
            rate_limited(None),
            rate_limited(None),
            rate_limited(None),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(provider.clone(), Arc::new(MemoryCache::new()), sleeper.clone())
            .with_retry(RetryPolicy {
                max_attempts: 4,
                base_delay: Duration::from_millis(100),
            });

        assert!(client.complete(&request()).await.is_err());
        assert_eq!(provider.calls(), 4);
        assert_eq!(
            sleeper.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn provider_suggested_delay_is_honoured() {
        let hint = json!({"error": {"details": [{"@type": RETRY_INFO_TYPE, "retryDelay": "7s"}]}});
        let provider = ScriptedProvider::new(vec![rate_limited(Some(hint)), ok("{}")]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(provider.clone(), Arc::new(MemoryCache::new()), sleeper.clone());

        let resp = client.complete(&request()).await.unwrap();
        assert_eq!(resp.content, "{}");
        assert_eq!(provider.calls(), 2);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(7)]);

        let records = client.history().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(records[0].error.is_none());
    }

    #[tokio::test]
    async fn malformed_hint_falls_back_to_backoff() {
        let hint = json!({"details": [{"@type": RETRY_INFO_TYPE, "retryDelay": "soon"}]});
        let provider = ScriptedProvider::new(vec![rate_limited(Some(hint)), ok("{}")]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(provider, Arc::new(MemoryCache::new()), sleeper.clone());

        client.complete(&request()).await.unwrap();
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Other("400 bad request".into())),
            ok("never reached"),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(provider.clone(), Arc::new(MemoryCache::new()), sleeper.clone());

        let err = client.complete(&request()).await.unwrap_err();
        assert_eq!(err, CompletionFailure::Provider("400 bad request".into()));
        assert_eq!(provider.calls(), 1);
        assert!(sleeper.sleeps().is_empty());
        assert_eq!(client.history().len(), 1);
    }

    #[tokio::test]
    async fn unknown_model_cost_degrades_to_zero() {
        let provider = ScriptedProvider::new(vec![ok("{}")]);
        let client = client(
            provider,
            Arc::new(MemoryCache::new()),
            Arc::new(RecordingSleeper::default()),
        )
        .with_pricing(Pricing::empty());

        assert!(client.complete(&request()).await.is_ok());
        let records = client.history().records();
        assert!(records[0].success);
        assert_eq!(records[0].cost_dollars, 0.0);
    }

    #[tokio::test]
    async fn cache_write_failure_still_returns_result() {
        let provider = ScriptedProvider::new(vec![ok("fresh"), ok("again")]);
        let client = client(
            provider.clone(),
            Arc::new(UnwritableCache),
            Arc::new(RecordingSleeper::default()),
        );

        assert_eq!(client.complete(&request()).await.unwrap().content, "fresh");
        // Not cached, so recomputed.
        assert_eq!(client.complete(&request()).await.unwrap().content, "again");
        assert_eq!(provider.calls(), 2);
        assert_eq!(client.history().len(), 2);
    }

    #[tokio::test]
    async fn file_cache_shared_across_clients() {
        let tmp = tempfile::TempDir::new().unwrap();
        let first_provider = ScriptedProvider::new(vec![ok("persisted")]);
        let first = client(
            first_provider.clone(),
            Arc::new(FileCache::open(tmp.path()).unwrap()),
            Arc::new(RecordingSleeper::default()),
        );
        first.complete(&request()).await.unwrap();

        let second_provider = ScriptedProvider::new(vec![]);
        let second = client(
            second_provider.clone(),
            Arc::new(FileCache::open(tmp.path()).unwrap()),
            Arc::new(RecordingSleeper::default()),
        );
        let resp = second.complete(&request()).await.unwrap();
        assert_eq!(resp.content, "persisted");
        assert_eq!(second_provider.calls(), 0);
        assert!(second.history().is_empty());
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
    }
}
