use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("page not found: {0}")]
    NotFound(String),
    #[error("{0} is not supported by this store")]
    Unsupported(&'static str),
    #[error("{0}")]
    Other(String),
}

/// The four document operations the pipeline needs, plus an optional
/// fenced property update.
///
/// Page and block values are the store's raw JSON objects.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<Value, NotionError>;

    /// All top-level content blocks of a page, in document order.
    async fn get_page_content(&self, page_id: &str) -> Result<Vec<Value>, NotionError>;

    async fn update_page_properties(
        &self,
        page_id: &str,
        properties: Value,
    ) -> Result<Value, NotionError>;

    async fn append_blocks(&self, parent_id: &str, blocks: Vec<Value>)
    -> Result<Value, NotionError>;

    /// Whether [`update_page_properties_if`](Self::update_page_properties_if)
    /// is implemented.
    fn supports_conditional_update(&self) -> bool {
        false
    }

    /// Update properties only if the page's fencing token (its
    /// `last_edited_time`) still equals `fence`. Returns `false` when another
    /// writer got there first.
    async fn update_page_properties_if(
        &self,
        _page_id: &str,
        _properties: Value,
        _fence: &str,
    ) -> Result<bool, NotionError> {
        Err(NotionError::Unsupported("conditional property update"))
    }
}
