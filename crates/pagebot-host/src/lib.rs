//! Webhook host: authenticates document-change notifications and drives the
//! extraction pipeline for the pages they name.

pub mod pipeline;
pub mod prompt;
pub mod server;
pub mod signature;

pub use pipeline::{Outcome, Pipeline, PipelineError, StepError};
pub use server::{AppState, WebhookReply, handle_webhook, router, serve};
pub use signature::{Rejection, Scheme, verify};
