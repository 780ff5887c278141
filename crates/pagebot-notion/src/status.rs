//! Reads and writes the processing status of a page.
//!
//! Claiming a page moves it from `ReadyForAnalysis` to `InProgress`. When
//! the store supports fenced writes the claim is conditional on the page's
//! `last_edited_time` being unchanged since the read; otherwise it is a
//! plain overwrite and two concurrent workers can both win.

use std::sync::Arc;

use pagebot_core::PageStatus;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::page;
use crate::store::{DocumentStore, NotionError};

#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// This worker owns the page; `page` is the snapshot read before claiming.
    Acquired { page: Value },
    NotEligible(PageStatus),
    /// Another writer changed the page between read and claim.
    Lost,
}

#[derive(Clone)]
pub struct StatusMachine {
    store: Arc<dyn DocumentStore>,
    property: String,
}

impl StatusMachine {
    pub fn new(store: Arc<dyn DocumentStore>, property: impl Into<String>) -> Self {
        Self {
            store,
            property: property.into(),
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn status_of(&self, page: &Value) -> PageStatus {
        page::page_status(page, &self.property)
    }

    pub async fn read(&self, page_id: &str) -> Result<PageStatus, NotionError> {
        let page = self.store.get_page(page_id).await?;
        Ok(self.status_of(&page))
    }

    /// Unconditionally write `status`.
    pub async fn transition(&self, page_id: &str, status: &PageStatus) -> Result<(), NotionError> {
        self.store
            .update_page_properties(page_id, page::status_payload(&self.property, status))
            .await?;
        info!(page_id, status = %status, "status updated");
        Ok(())
    }

    /// Read the page and, if eligible, move it to `InProgress`.
    pub async fn claim(&self, page_id: &str) -> Result<Claim, NotionError> {
        let snapshot = self.store.get_page(page_id).await?;
        let current = self.status_of(&snapshot);
        if !current.is_eligible() {
            debug!(page_id, status = %current, "page not eligible");
            return Ok(Claim::NotEligible(current));
        }

        let payload = page::status_payload(&self.property, &PageStatus::InProgress);
        if self.store.supports_conditional_update()
            && let Some(fence) = page::last_edited_time(&snapshot)
        {
            if !self
                .store
                .update_page_properties_if(page_id, payload, fence)
                .await?
            {
                warn!(page_id, "claim lost to a concurrent writer");
                return Ok(Claim::Lost);
            }
        } else {
            debug!(
                page_id,
                "store has no fenced writes; claim is a plain overwrite"
            );
            self.store.update_page_properties(page_id, payload).await?;
        }
        info!(page_id, status = %PageStatus::InProgress, "page claimed");
        Ok(Claim::Acquired { page: snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreCall, page_with_status};
    use async_trait::async_trait;

    const STATUS: &str = "Joko Bot - Status";

    fn machine(store: Arc<MemoryStore>) -> StatusMachine {
        StatusMachine::new(store, STATUS)
    }

    #[tokio::test]
    async fn claims_ready_page() {
        let store = Arc::new(MemoryStore::new());
        store.insert_page(page_with_status("p1", STATUS, Some("Ready for Analysis")));

        let claim = machine(store.clone()).claim("p1").await.unwrap();

        assert!(matches!(claim, Claim::Acquired { .. }));
        assert_eq!(
            store.status_history("p1", STATUS),
            vec![PageStatus::InProgress]
        );
    }

    #[tokio::test]
    async fn ineligible_statuses_are_left_alone() {
        for label in [None, Some("Done"), Some("In Progress"), Some("Error Processing"), Some("Draft")] {
            let store = Arc::new(MemoryStore::new());
            store.insert_page(page_with_status("p1", STATUS, label));

            let claim = machine(store.clone()).claim("p1").await.unwrap();

            assert_eq!(claim, Claim::NotEligible(PageStatus::from_label(label)));
            assert_eq!(store.write_calls(), 0);
        }
    }

    #[tokio::test]
    async fn fenced_claim_used_when_supported() {
        let store = Arc::new(MemoryStore::new().with_conditional_updates());
        store.insert_page(page_with_status("p1", STATUS, Some("Ready for Analysis")));

        machine(store.clone()).claim("p1").await.unwrap();

        assert!(
            store
                .calls()
                .iter()
                .any(|c| matches!(c, StoreCall::UpdatePropertiesIf { .. }))
        );
    }

    /// Lets another writer touch the page between the read and the claim.
    struct RacingStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl DocumentStore for RacingStore {
        async fn get_page(&self, page_id: &str) -> Result<Value, NotionError> {
            let page = self.inner.get_page(page_id).await?;
            self.inner
                .update_page_properties(page_id, serde_json::json!({"Notes": {"rich_text": []}}))
                .await?;
            Ok(page)
        }
        async fn get_page_content(&self, page_id: &str) -> Result<Vec<Value>, NotionError> {
            self.inner.get_page_content(page_id).await
        }
        async fn update_page_properties(
            &self,
            page_id: &str,
            properties: Value,
        ) -> Result<Value, NotionError> {
            self.inner.update_page_properties(page_id, properties).await
        }
        async fn append_blocks(
            &self,
            parent_id: &str,
            blocks: Vec<Value>,
        ) -> Result<Value, NotionError> {
            self.inner.append_blocks(parent_id, blocks).await
        }
        fn supports_conditional_update(&self) -> bool {
            true
        }
        async fn update_page_properties_if(
            &self,
            page_id: &str,
            properties: Value,
            fence: &str,
        ) -> Result<bool, NotionError> {
            self.inner
                .update_page_properties_if(page_id, properties, fence)
                .await
        }
    }

    #[tokio::test]
    async fn concurrent_edit_loses_claim() {
        let inner = Arc::new(MemoryStore::new().with_conditional_updates());
        inner.insert_page(page_with_status("p1", STATUS, Some("Ready for Analysis")));
        let racing = Arc::new(RacingStore {
            inner: inner.clone(),
        });

        let claim = StatusMachine::new(racing, STATUS).claim("p1").await.unwrap();

        assert_eq!(claim, Claim::Lost);
        assert!(inner.status_history("p1", STATUS).is_empty());
    }

    #[tokio::test]
    async fn transition_writes_label() {
        let store = Arc::new(MemoryStore::new());
        store.insert_page(page_with_status("p1", STATUS, Some("In Progress")));
        let m = machine(store.clone());

        m.transition("p1", &PageStatus::ErrorProcessing).await.unwrap();

        assert_eq!(m.read("p1").await.unwrap(), PageStatus::ErrorProcessing);
    }

    #[tokio::test]
    async fn read_missing_page_fails() {
        let store = Arc::new(MemoryStore::new());
        assert!(machine(store).read("gone").await.is_err());
    }
}
