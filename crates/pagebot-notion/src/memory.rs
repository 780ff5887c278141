//! In-process [`DocumentStore`] for tests. Compiled only under `cfg(test)`
//! or the `test-support` feature.
//!
//! Every successful property write bumps the page's `last_edited_time`, so
//! conditional updates behave like a fenced store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use pagebot_core::PageStatus;
use serde_json::{Map, Value, json};

use crate::store::{DocumentStore, NotionError};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    GetPage(String),
    GetPageContent(String),
    UpdateProperties {
        page_id: String,
        properties: Value,
    },
    UpdatePropertiesIf {
        page_id: String,
        properties: Value,
        fence: String,
    },
    AppendBlocks {
        parent_id: String,
        blocks: Vec<Value>,
    },
}

#[derive(Default)]
struct Inner {
    pages: HashMap<String, Value>,
    content: HashMap<String, Vec<Value>>,
    calls: Vec<StoreCall>,
    /// Property payloads that were actually applied, in order.
    applied: Vec<(String, Value)>,
    edits: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    conditional: bool,
    fail_appends: bool,
}

/// A minimal page object whose `property` select holds `status`.
pub fn page_with_status(page_id: &str, property: &str, status: Option<&str>) -> Value {
    let select = status.map(|name| json!({ "name": name })).unwrap_or(Value::Null);
    json!({
        "object": "page",
        "id": page_id,
        "last_edited_time": revision(0),
        "properties": {
            "Name": {"type": "title", "title": [
                {"type": "text", "text": {"content": page_id}, "plain_text": page_id}
            ]},
            property: {"type": "select", "select": select},
        },
    })
}

fn revision(n: u64) -> String {
    format!("2025-01-01T00:{:02}:{:02}.000Z", (n / 60) % 60, n % 60)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable [`DocumentStore::update_page_properties_if`].
    pub fn with_conditional_updates(mut self) -> Self {
        self.conditional = true;
        self
    }

    /// Make every `append_blocks` call fail with a server error.
    pub fn failing_appends(mut self) -> Self {
        self.fail_appends = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or replace a page, keyed by its `id` field.
    pub fn insert_page(&self, page: Value) {
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.lock().pages.insert(id, page);
    }

    pub fn set_content(&self, page_id: &str, blocks: Vec<Value>) {
        self.lock().content.insert(page_id.to_string(), blocks);
    }

    pub fn page(&self, page_id: &str) -> Option<Value> {
        self.lock().pages.get(page_id).cloned()
    }

    pub fn content(&self, page_id: &str) -> Vec<Value> {
        self.lock().content.get(page_id).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of calls that mutated or attempted to mutate the store.
    pub fn write_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                !matches!(c, StoreCall::GetPage(_) | StoreCall::GetPageContent(_))
            })
            .count()
    }

    /// Blocks appended through the store, across all pages.
    pub fn appended_blocks(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::AppendBlocks { blocks, .. } => Some(blocks),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Statuses written to `property` of `page_id`, in order. Only applied
    /// writes are listed.
    pub fn status_history(&self, page_id: &str, property: &str) -> Vec<PageStatus> {
        self.lock()
            .applied
            .iter()
            .filter(|(id, _)| id == page_id)
            .filter_map(|(_, props)| props.get(property))
            .map(|prop| {
                PageStatus::from_label(
                    prop.get("select")
                        .and_then(|s| s.get("name"))
                        .and_then(Value::as_str),
                )
            })
            .collect()
    }

    fn apply(inner: &mut Inner, page_id: &str, properties: &Value) -> Result<Value, NotionError> {
        inner.edits += 1;
        let stamp = revision(inner.edits);
        let page = inner
            .pages
            .get_mut(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))?;
        let Some(fields) = page.as_object_mut() else {
            return Err(NotionError::Other(format!("page {page_id} is not an object")));
        };
        if let Some(updates) = properties.as_object()
            && let Value::Object(props) = fields.entry("properties").or_insert_with(|| json!({}))
        {
            for (name, value) in updates {
                props.insert(name.clone(), typed_property(value));
            }
        }
        fields.insert("last_edited_time".into(), Value::String(stamp));
        let updated = page.clone();
        inner.applied.push((page_id.to_string(), properties.clone()));
        Ok(updated)
    }
}

/// Write payloads omit the `type` tag that reads carry; add it back.
fn typed_property(value: &Value) -> Value {
    match value.as_object() {
        Some(obj) if obj.len() == 1 && !obj.contains_key("type") => {
            let mut typed: Map<String, Value> = obj.clone();
            if let Some(kind) = obj.keys().next() {
                typed.insert("type".into(), Value::String(kind.clone()));
            }
            Value::Object(typed)
        }
        _ => value.clone(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_page(&self, page_id: &str) -> Result<Value, NotionError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::GetPage(page_id.to_string()));
        inner
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))
    }

    async fn get_page_content(&self, page_id: &str) -> Result<Vec<Value>, NotionError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(StoreCall::GetPageContent(page_id.to_string()));
        if !inner.pages.contains_key(page_id) {
            return Err(NotionError::NotFound(page_id.to_string()));
        }
        Ok(inner.content.get(page_id).cloned().unwrap_or_default())
    }

    async fn update_page_properties(
        &self,
        page_id: &str,
        properties: Value,
    ) -> Result<Value, NotionError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::UpdateProperties {
            page_id: page_id.to_string(),
            properties: properties.clone(),
        });
        Self::apply(&mut inner, page_id, &properties)
    }

    async fn append_blocks(
        &self,
        parent_id: &str,
        blocks: Vec<Value>,
    ) -> Result<Value, NotionError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::AppendBlocks {
            parent_id: parent_id.to_string(),
            blocks: blocks.clone(),
        });
        if self.fail_appends {
            return Err(NotionError::Server {
                status: 503,
                body: "append rejected".into(),
            });
        }
        if !inner.pages.contains_key(parent_id) {
            return Err(NotionError::NotFound(parent_id.to_string()));
        }
        inner
            .content
            .entry(parent_id.to_string())
            .or_default()
            .extend(blocks.iter().cloned());
        Ok(json!({ "object": "list", "results": blocks }))
    }

    fn supports_conditional_update(&self) -> bool {
        self.conditional
    }

    async fn update_page_properties_if(
        &self,
        page_id: &str,
        properties: Value,
        fence: &str,
    ) -> Result<bool, NotionError> {
        if !self.conditional {
            return Err(NotionError::Unsupported("conditional property update"));
        }
        let mut inner = self.lock();
        inner.calls.push(StoreCall::UpdatePropertiesIf {
            page_id: page_id.to_string(),
            properties: properties.clone(),
            fence: fence.to_string(),
        });
        let current = inner
            .pages
            .get(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))?
            .get("last_edited_time")
            .and_then(Value::as_str)
            .map(str::to_string);
        if current.as_deref() != Some(fence) {
            return Ok(false);
        }
        Self::apply(&mut inner, page_id, &properties)?;
        Ok(true)
    }
}
