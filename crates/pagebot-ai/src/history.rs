//! Record of completion calls that actually reached the provider.
//!
//! Cache hits are never recorded: they cost nothing and must not inflate
//! spend or latency totals.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    /// Final outcome after retries.
    pub success: bool,
    pub error: Option<String>,
    pub response_id: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_dollars: f64,
    /// Wall time across all attempts, including backoff sleeps.
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySummary {
    pub calls: usize,
    pub failures: usize,
    pub total_cost_dollars: f64,
    pub total_duration_seconds: f64,
}

/// Append-only, process-lifetime history.
#[derive(Debug, Default)]
pub struct CompletionHistory {
    records: Mutex<Vec<CompletionRecord>>,
}

impl CompletionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: CompletionRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    pub fn records(&self) -> Vec<CompletionRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> f64 {
        self.records().iter().map(|r| r.cost_dollars).sum()
    }

    pub fn total_duration(&self) -> f64 {
        self.records().iter().map(|r| r.duration_seconds).sum()
    }

    pub fn summary(&self) -> HistorySummary {
        let records = self.records();
        HistorySummary {
            calls: records.len(),
            failures: records.iter().filter(|r| !r.success).count(),
            total_cost_dollars: records.iter().map(|r| r.cost_dollars).sum(),
            total_duration_seconds: records.iter().map(|r| r.duration_seconds).sum(),
        }
    }
}
