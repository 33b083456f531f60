// Message bean plus the reserved header keys and the
// `MessageReceived` wrapper used by transports on the inbound path.

use super::uid::Uid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved header keys.
pub mod headers {
    pub const HERALD_VERSION: &str = "herald-version";
    pub const SENDER_UID: &str = "sender-uid";
    pub const TARGET_PEER: &str = "target-peer";
    pub const REPLIES_TO: &str = "replies-to";
    pub const ORIGINAL_SENDER: &str = "original-sender";
    pub const FINAL_DESTINATION: &str = "final-destination";
    pub const GROUP: &str = "group";
}

/// Current wire protocol version, stamped into every outbound message's
/// `herald-version` header.
pub const HERALD_VERSION: &str = "1";

/// Message content. Host peers exchange a JSON-typed tree; the micronode
/// variant only ever produces/consumes an ad-hoc string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Empty,
    Json(serde_json::Value),
    Raw(String),
}

impl Content {
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    pub fn as_raw(&self) -> String {
        match self {
            Content::Empty => String::new(),
            Content::Json(v) => v.to_string(),
            Content::Raw(s) => s.clone(),
        }
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Content::Empty
        } else {
            Content::Raw(s)
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Empty
    }
}

/// A Herald message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub uid: Uid,
    /// Epoch-ms at construction.
    pub timestamp: i64,
    pub headers: HashMap<String, String>,
    pub content: Content,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Construct a new outbound message. `uid` is drawn at random and
    /// `timestamp` is stamped now.
    pub fn new(subject: impl Into<String>, content: Content) -> Self {
        Self {
            subject: subject.into(),
            uid: Uid::new_random(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            headers: HashMap::new(),
            content,
            metadata: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }

    pub fn sender_uid(&self) -> Option<&str> {
        self.header(headers::SENDER_UID)
    }

    pub fn replies_to(&self) -> Option<&str> {
        self.header(headers::REPLIES_TO)
    }

    /// Stamp the headers that must be non-empty before the message leaves
    /// the local peer: `sender-uid`, `herald-version`,
    /// and - if missing - `original-sender`.
    pub fn stamp_outbound(&mut self, local_uid: &str) {
        self.headers
            .entry(headers::SENDER_UID.to_string())
            .or_insert_with(|| local_uid.to_string());
        self.headers
            .entry(headers::HERALD_VERSION.to_string())
            .or_insert_with(|| HERALD_VERSION.to_string());
        self.headers
            .entry(headers::ORIGINAL_SENDER.to_string())
            .or_insert_with(|| local_uid.to_string());
    }

    /// True once every invariant-required field is present (used in tests
    /// and as a defensive check before a transport serializes the message).
    pub fn is_well_formed(&self) -> bool {
        !self.subject.is_empty()
            && !self.uid.as_str().is_empty()
            && self.header(headers::SENDER_UID).is_some_and(|s| !s.is_empty())
            && self
                .header(headers::HERALD_VERSION)
                .is_some_and(|s| !s.is_empty())
    }
}

/// Inbound message plus the transport-layer context it arrived with: which
/// access produced it, and whatever transport-specific extras came along
/// (e.g. the MAC address the frame arrived on).
#[derive(Debug, Clone)]
pub struct MessageReceived {
    pub message: Message,
    /// Access-id of the transport that produced this message.
    pub access: String,
    /// Transport-specific context, e.g. the MAC address the frame arrived
    /// on for the Bluetooth transport.
    pub extra: HashMap<String, String>,
}
