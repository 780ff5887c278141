//! Extraction prompt: fixed system contract plus page-derived user message.

use pagebot_core::{CompletionRequest, Message, PipelineConfig};
use serde_json::{Map, Value};

pub const SYSTEM_PROMPT: &str = "\
You extract merchant and offer information from a page describing a merchant partnership.

You are given the page's properties and its text content. Identify the merchant and every \
distinct offer the page describes.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"merchant\": {
    \"name\": \"the merchant's name\",
    \"additional_details\": { \"any other merchant facts\": \"as string values\" }
  },
  \"offers\": [
    {
      \"offer_value_statement\": \"one sentence stating what the customer gets\",
      \"additional_details\": { \"conditions, dates, codes\": \"as string values\" }
    }
  ]
}

The merchant name and every offer_value_statement must be non-empty.
If the page describes no offers, return an empty offers array.
Use additional_details only for facts stated on the page; do not invent values.";

pub fn build_user_prompt(properties: &Map<String, Value>, content: &str) -> String {
    let properties = serde_json::to_string_pretty(properties).unwrap_or_else(|_| "{}".into());
    format!(
        "Page properties:\n\
         {properties}\n\
         \n\
         Page content:\n\
         {content}"
    )
}

pub fn build_request(
    config: &PipelineConfig,
    properties: &Map<String, Value>,
    content: &str,
) -> CompletionRequest {
    let request = CompletionRequest::new(
        config.model.clone(),
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_user_prompt(properties, content)),
        ],
    );
    config
        .completion_options
        .iter()
        .fold(request, |req, (key, value)| {
            req.with_option(key.clone(), value.clone())
        })
}
