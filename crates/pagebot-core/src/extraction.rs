//! Structured merchant/offer data extracted from a page by the model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("model output is not valid extraction JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("merchant name is empty")]
    EmptyMerchantName,
    #[error("offer {0} has an empty offer_value_statement")]
    EmptyOfferStatement(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub name: String,
    #[serde(default)]
    pub additional_details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_value_statement: String,
    #[serde(default)]
    pub additional_details: Map<String, Value>,
}

/// One merchant and the offers found for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub merchant: Merchant,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl ExtractionResult {
    /// Parse and validate model output.
    ///
    /// A single surrounding markdown code fence is tolerated; anything else
    /// that is not a JSON object of the expected shape is rejected.
    pub fn parse(text: &str) -> Result<Self, ExtractionError> {
        let result: Self = serde_json::from_str(strip_code_fence(text))?;
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.merchant.name.trim().is_empty() {
            return Err(ExtractionError::EmptyMerchantName);
        }
        if let Some(i) = self
            .offers
            .iter()
            .position(|o| o.offer_value_statement.trim().is_empty())
        {
            return Err(ExtractionError::EmptyOfferStatement(i));
        }
        Ok(())
    }

    /// Pretty-printed JSON for writing back to the page.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence line.
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}
