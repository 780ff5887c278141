//! Completion provider seam and its error taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use pagebot_core::{CompletionRequest, CompletionResponse};
use serde_json::Value;
use thiserror::Error;

/// `@type` of the detail entry carrying a server-suggested retry delay.
pub const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Throttling. The only retryable class.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Parsed error body, if the provider sent JSON.
        payload: Option<Value>,
    },
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Delay suggested by the provider, when the payload carries a
    /// well-formed one.
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                payload: Some(p), ..
            } => parse_retry_delay(p),
            _ => None,
        }
    }
}

/// Anything that can turn a [`CompletionRequest`] into a response.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// Extract `retryDelay` from a RetryInfo detail entry.
///
/// Accepts the detail container itself, one wrapped under `error`, or an
/// array of either. Only `<integer>s` is understood; anything else yields
/// `None` so the caller falls back to exponential backoff.
pub fn parse_retry_delay(payload: &Value) -> Option<Duration> {
    let containers: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let retry_info = containers
        .into_iter()
        .flat_map(|c| [Some(c), c.get("error")])
        .flatten()
        .filter_map(|c| c.get("details").and_then(Value::as_array))
        .flatten()
        .find(|d| d.get("@type").and_then(Value::as_str) == Some(RETRY_INFO_TYPE))?;

    let raw = retry_info.get("retryDelay")?.as_str()?;
    let secs: u64 = raw.strip_suffix('s')?.parse().ok()?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn retry_info(delay: &str) -> Value {
        json!({"@type": RETRY_INFO_TYPE, "retryDelay": delay})
    }

    #[test]
    fn top_level_details() {
        let payload = json!({"details": [retry_info("12s")]});
        assert_eq!(parse_retry_delay(&payload), Some(Duration::from_secs(12)));
    }

    #[test]
    fn wrapped_under_error() {
        let payload = json!({"error": {"code": 429, "details": [
            {"@type": "type.googleapis.com/google.rpc.QuotaFailure"},
            retry_info("31s")
        ]}});
        assert_eq!(parse_retry_delay(&payload), Some(Duration::from_secs(31)));
    }

    #[test]
    fn array_of_errors() {
        let payload = json!([{"error": {"details": [retry_info("4s")]}}]);
        assert_eq!(parse_retry_delay(&payload), Some(Duration::from_secs(4)));
    }

    #[test]
    fn malformed_delay_falls_through() {
        for bad in ["1.5s", "10", "ten s", "s", ""] {
            let payload = json!({"details": [retry_info(bad)]});
            assert_eq!(parse_retry_delay(&payload), None, "{bad:?}");
        }
    }

    #[test]
    fn no_retry_info() {
        assert_eq!(parse_retry_delay(&json!({"message": "slow down"})), None);
        assert_eq!(parse_retry_delay(&json!("text body")), None);
        assert_eq!(parse_retry_delay(&json!({"details": "nope"})), None);
    }

    #[test]
    fn suggested_delay_only_for_rate_limits() {
        let err = ProviderError::RateLimited {
            message: "429".into(),
            payload: Some(json!({"details": [retry_info("2s")]})),
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(2)));

        let other = ProviderError::Other("boom".into());
        assert!(!other.is_rate_limit());
        assert_eq!(other.suggested_delay(), None);
    }
}
