//! Notion REST client implementing [`DocumentStore`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::store::{DocumentStore, NotionError};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// HTTP client for the Notion pages and blocks endpoints.
pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    version: String,
}

#[derive(Deserialize)]
struct BlockList {
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl NotionClient {
    /// `base_url` is like `https://api.notion.com/v1`; a trailing slash is
    /// dropped.
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            version: NOTION_VERSION.to_string(),
        }
    }

    /// Override the `Notion-Version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
    }

    /// One page of a block's children; the cursor is sent query-encoded.
    fn children_request(&self, block_id: &str, cursor: Option<&str>) -> reqwest::RequestBuilder {
        let mut query = vec![("page_size", PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor.to_string()));
        }
        self.request(reqwest::Method::GET, &format!("/blocks/{block_id}/children"))
            .query(&query)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, NotionError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotionError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    async fn get_page(&self, page_id: &str) -> Result<Value, NotionError> {
        debug!(page_id, "fetching page");
        self.send(self.request(reqwest::Method::GET, &format!("/pages/{page_id}")))
            .await
    }

    async fn get_page_content(&self, page_id: &str) -> Result<Vec<Value>, NotionError> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let value = self
                .send(self.children_request(page_id, cursor.as_deref()))
                .await?;
            let batch: BlockList = serde_json::from_value(value)?;
            blocks.extend(batch.results);
            match batch.next_cursor {
                Some(next) if batch.has_more => cursor = Some(next),
                _ => break,
            }
        }
        debug!(page_id, count = blocks.len(), "fetched page content");
        Ok(blocks)
    }

    async fn update_page_properties(
        &self,
        page_id: &str,
        properties: Value,
    ) -> Result<Value, NotionError> {
        info!(page_id, "updating page properties");
        let req = self
            .request(reqwest::Method::PATCH, &format!("/pages/{page_id}"))
            .json(&json!({ "properties": properties }));
        self.send(req).await
    }

    async fn append_blocks(
        &self,
        parent_id: &str,
        blocks: Vec<Value>,
    ) -> Result<Value, NotionError> {
        info!(parent_id, count = blocks.len(), "appending blocks");
        let req = self
            .request(
                reqwest::Method::PATCH,
                &format!("/blocks/{parent_id}/children"),
            )
            .json(&json!({ "children": blocks }));
        self.send(req).await
    }
}
