//! Inbound webhook payloads and the page events derived from them.

use serde::Deserialize;
use serde_json::Value;

/// Header carrying the timestamp signed by the V2 scheme.
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
/// Header carrying `<scheme>=<hex>` for the V2 scheme.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Header carrying the bare hex digest for the V1 scheme.
pub const LEGACY_SIGNATURE_HEADER: &str = "x-notion-signature";

/// Event types that can change what the model would extract.
pub const PAGE_CONTENT_EVENTS: &[&str] = &[
    "page.created",
    "page.content_updated",
    "page.properties_updated",
    "page.undeleted",
];

/// Signature-related header values, captured verbatim at the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    pub legacy_signature: Option<String>,
}

/// What an inbound body turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Subscription handshake; the value must be echoed back.
    Challenge(Value),
    /// Legacy verification message; acknowledged with an empty body.
    VerificationToken(Value),
    /// A regular event envelope.
    Event(EventEnvelope),
    /// Body is not a JSON object.
    Unparseable,
}

impl Payload {
    pub fn parse(body: &[u8]) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
            return Self::Unparseable;
        };
        if let Some(v) = map.get("challenge") {
            return Self::Challenge(v.clone());
        }
        if let Some(v) = map.get("verification_token") {
            return Self::VerificationToken(v.clone());
        }
        match serde_json::from_value(Value::Object(map)) {
            Ok(envelope) => Self::Event(envelope),
            Err(_) => Self::Unparseable,
        }
    }

    /// Handshake messages are not signed and bypass verification.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Challenge(_) | Self::VerificationToken(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub entity: Option<Entity>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Entity {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
}

/// A verified-or-not inbound event. Immutable once built.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub event_type: Option<String>,
    pub raw_body: Vec<u8>,
    pub signature_headers: SignatureHeaders,
}

impl PageEvent {
    pub fn new(envelope: EventEnvelope, raw_body: Vec<u8>, headers: SignatureHeaders) -> Self {
        let (entity_id, entity_type) = match envelope.entity {
            Some(e) => (e.id, e.entity_type),
            None => (None, None),
        };
        Self {
            entity_id,
            entity_type,
            event_type: envelope.event_type,
            raw_body,
            signature_headers: headers,
        }
    }

    /// Page id when this is a page-content event with a usable id.
    ///
    /// Events without a type are accepted as long as the entity is a page.
    pub fn page_id(&self) -> Option<&str> {
        if self.entity_type.as_deref() != Some("page") {
            return None;
        }
        if let Some(kind) = self.event_type.as_deref()
            && !PAGE_CONTENT_EVENTS.contains(&kind)
        {
            return None;
        }
        self.entity_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}
