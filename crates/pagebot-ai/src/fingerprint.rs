//! Deterministic request fingerprints for the completion cache.
//!
//! Canonical form is the JSON serialisation of
//! `{"model", "messages", "options": [[key, value], ...]}` with options
//! sorted by key, hashed with SHA-256.

use pagebot_core::{CompletionRequest, Fingerprint, Message};
use ring::digest::{SHA256, digest};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct Canonical<'a> {
    model: &'a str,
    messages: &'a [Message],
    options: Vec<(&'a str, &'a Value)>,
}

/// Canonical bytes hashed into the fingerprint.
pub fn canonical_bytes(request: &CompletionRequest) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Canonical {
        model: &request.model,
        messages: &request.messages,
        options: request.sorted_options(),
    })
}

pub fn fingerprint(request: &CompletionRequest) -> Result<Fingerprint, serde_json::Error> {
    let bytes = canonical_bytes(request)?;
    Ok(Fingerprint::from_hex(hex::encode(digest(&SHA256, &bytes))))
}
