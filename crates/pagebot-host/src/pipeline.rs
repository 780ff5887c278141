//! Per-page extraction run.
//!
//! ```text
//! claim ─▶ fetch content ─▶ prompt ─▶ complete ─▶ validate ─▶ append ─▶ Done
//!   │                                                                    ▲
//!   └─ not eligible / lost: stop        any step fails ─▶ ErrorProcessing
//! ```

use std::sync::Arc;

use pagebot_ai::{CompletionClient, CompletionFailure};
use pagebot_core::{
    Block, ExtractionError, ExtractionResult, PageEvent, PageStatus, PipelineConfig,
    blocks_to_text,
};
use pagebot_notion::{Claim, DocumentStore, NotionError, StatusMachine, page};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::prompt;

/// A failure inside one of the steps after the claim.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("document store: {0}")]
    Store(#[from] NotionError),
    #[error("completion: {0}")]
    Completion(#[from] CompletionFailure),
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    #[error("could not render extraction result: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading or claiming the page failed; its status was not changed.
    #[error("could not claim page {page_id}: {source}")]
    Claim {
        page_id: String,
        #[source]
        source: NotionError,
    },
    /// The page was claimed and then a later step failed.
    #[error("processing page {page_id} failed: {source}")]
    Processing {
        page_id: String,
        #[source]
        source: StepError,
    },
}

impl PipelineError {
    /// Page this worker had claimed when the failure happened.
    pub fn claimed_page_id(&self) -> Option<&str> {
        match self {
            Self::Processing { page_id, .. } => Some(page_id),
            Self::Claim { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event does not refer to a page content change.
    Ignored,
    /// The page was not in a claimable status.
    Skipped(PageStatus),
    /// Another worker claimed the page first.
    Lost,
    Completed {
        page_id: String,
        result: ExtractionResult,
    },
}

impl Outcome {
    pub fn processed_page_id(&self) -> Option<&str> {
        match self {
            Self::Completed { page_id, .. } => Some(page_id),
            _ => None,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    status: StatusMachine,
    completions: Arc<CompletionClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        completions: Arc<CompletionClient>,
        config: PipelineConfig,
    ) -> Self {
        let status = StatusMachine::new(store.clone(), config.status_property.clone());
        Self {
            store,
            status,
            completions,
            config,
        }
    }

    pub fn completions(&self) -> &CompletionClient {
        &self.completions
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn handle(&self, event: &PageEvent) -> Result<Outcome, PipelineError> {
        let Some(page_id) = event.page_id() else {
            info!(
                event_type = event.event_type.as_deref().unwrap_or("<none>"),
                entity_type = event.entity_type.as_deref().unwrap_or("<none>"),
                "ignoring event"
            );
            return Ok(Outcome::Ignored);
        };
        self.process_page(page_id).await
    }

    /// Run the extraction for one page if its status allows it.
    pub async fn process_page(&self, page_id: &str) -> Result<Outcome, PipelineError> {
        let snapshot = match self.status.claim(page_id).await {
            Ok(Claim::Acquired { page }) => page,
            Ok(Claim::NotEligible(status)) => {
                info!(page_id, status = %status, "skipping page");
                return Ok(Outcome::Skipped(status));
            }
            Ok(Claim::Lost) => {
                info!(page_id, "page claimed elsewhere");
                return Ok(Outcome::Lost);
            }
            Err(source) => {
                error!(page_id, error = %source, "could not claim page");
                return Err(PipelineError::Claim {
                    page_id: page_id.to_string(),
                    source,
                });
            }
        };

        match self.run_claimed(page_id, &snapshot).await {
            Ok(result) => {
                info!(
                    page_id,
                    merchant = %result.merchant.name,
                    offers = result.offers.len(),
                    "page processed"
                );
                Ok(Outcome::Completed {
                    page_id: page_id.to_string(),
                    result,
                })
            }
            Err(source) => {
                error!(page_id, error = %source, "page processing failed");
                if let Err(e) = self
                    .status
                    .transition(page_id, &PageStatus::ErrorProcessing)
                    .await
                {
                    warn!(page_id, error = %e, "could not record error status");
                }
                Err(PipelineError::Processing {
                    page_id: page_id.to_string(),
                    source,
                })
            }
        }
    }

    async fn run_claimed(
        &self,
        page_id: &str,
        snapshot: &Value,
    ) -> Result<ExtractionResult, StepError> {
        let raw_blocks = self.store.get_page_content(page_id).await?;
        let blocks: Vec<Block> = raw_blocks.iter().map(Block::from_json).collect();
        let content = blocks_to_text(&blocks);

        let properties = page::render_properties(snapshot, &[self.status.property()]);
        let request = prompt::build_request(&self.config, &properties, &content);
        let response = self.completions.complete(&request).await?;

        let result = ExtractionResult::parse(&response.content)?;
        let rendered = result.to_pretty_json()?;
        self.store
            .append_blocks(page_id, vec![page::code_block(&rendered, "json")])
            .await?;
        self.status.transition(page_id, &PageStatus::Done).await?;
        Ok(result)
    }
}
