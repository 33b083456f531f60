// Peer/message identity: a 32-hex, dash-grouped string in 8-4-4-4-12 form.
// We reuse `uuid` v4 generation (already in the workspace dependency set)
// since its default `Display` is exactly that form.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(String);

impl Uid {
    /// Generate a new random UID.
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing 8-4-4-4-12 hex string without validating it.
    ///
    /// Used when decoding wire messages: a malformed UID from a remote peer
    /// is not itself a framing error.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uid> for String {
    fn from(u: Uid) -> Self {
        u.0
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
