//! AI layer: cached, rate-limit-aware LLM completions with usage accounting.

pub mod client;
pub mod fingerprint;
pub mod history;
pub mod openai;
pub mod pricing;
pub mod provider;

pub use client::{CompletionClient, CompletionFailure, RetryPolicy, Sleeper, TokioSleeper};
pub use fingerprint::fingerprint;
pub use history::{CompletionHistory, CompletionRecord, HistorySummary};
pub use openai::OpenAiCompatProvider;
pub use pricing::Pricing;
pub use provider::{CompletionProvider, ProviderError};
