//! Per-model token pricing used to estimate the cost of a completion.

use std::collections::HashMap;

use pagebot_core::Usage;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PricingError {
    #[error("no price known for model {0}")]
    UnknownModel(String),
    #[error("response carries no usage data")]
    MissingUsage,
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

#[derive(Debug, Clone)]
pub struct Pricing {
    prices: HashMap<String, ModelPrice>,
}

impl Default for Pricing {
    fn default() -> Self {
        Self::empty()
            .with_model("gemini-2.5-flash", 0.30, 2.50)
            .with_model("gemini-2.5-pro", 1.25, 10.00)
            .with_model("gemini-2.0-flash", 0.10, 0.40)
            .with_model("gpt-4o", 2.50, 10.00)
            .with_model("gpt-4o-mini", 0.15, 0.60)
    }
}

impl Pricing {
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: &str, input_per_mtok: f64, output_per_mtok: f64) -> Self {
        self.prices.insert(
            model.to_string(),
            ModelPrice {
                input_per_mtok,
                output_per_mtok,
            },
        );
        self
    }

    /// Price for `model`, ignoring a `provider/` routing prefix.
    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied().or_else(|| {
            let (_, bare) = model.rsplit_once('/')?;
            self.prices.get(bare).copied()
        })
    }

    /// Dollar cost of one completion.
    pub fn cost(&self, model: &str, usage: Option<&Usage>) -> Result<f64, PricingError> {
        let usage = usage.ok_or(PricingError::MissingUsage)?;
        let price = self
            .price(model)
            .ok_or_else(|| PricingError::UnknownModel(model.to_string()))?;
        Ok((usage.prompt_tokens as f64 * price.input_per_mtok
            + usage.completion_tokens as f64 * price.output_per_mtok)
            / 1_000_000.0)
    }
}
