//! Settings shared by the pipeline, assembled once at process start.

use std::collections::HashMap;

use serde_json::{Value, json};

pub const DEFAULT_STATUS_PROPERTY: &str = "Joko Bot - Status";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model name sent to the completion provider.
    pub model: String,
    /// Name of the select property holding the processing status.
    pub status_property: String,
    /// Extra provider parameters sent with every extraction request.
    pub completion_options: HashMap<String, Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl PipelineConfig {
    /// Deterministic JSON-mode defaults for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        let mut completion_options = HashMap::new();
        completion_options.insert("temperature".to_string(), json!(0));
        completion_options.insert(
            "response_format".to_string(),
            json!({ "type": "json_object" }),
        );
        Self {
            model: model.into(),
            status_property: DEFAULT_STATUS_PROPERTY.to_string(),
            completion_options,
        }
    }

    pub fn with_status_property(mut self, name: impl Into<String>) -> Self {
        self.status_property = name.into();
        self
    }
}
