// Error taxonomy for the Herald runtime.
//
// `anyhow::Result` is used at the edges (tests, demo binaries, top-level
// driving loops); internal call chains that callers need to pattern-match
// on return `HeraldError` via `thiserror`, matching the
// `runar_common::errors` split of re-exporting both.

pub use anyhow::anyhow;
pub use thiserror::Error;

/// The closed error taxonomy for the runtime: framing/link/bus/discovery/
/// RPC failures, each with a fixed recovery policy at the call site (see
/// module docs at each site).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeraldError {
    /// Framing layer: drop the offending frame, reset the codec, continue.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Transport layer: the link this send was addressed to is closed.
    #[error("link closed")]
    LinkClosed,

    /// Transport layer: no link exists for the given address.
    #[error("no link for address {0}")]
    NoLink(String),

    /// Bus layer: no transport advertises an access the peer exposes.
    #[error("no transport available for peer {0}")]
    NoTransport(String),

    /// Discovery layer: access descriptor missing or un-loadable.
    #[error("invalid access for peer {0}: {1}")]
    InvalidPeerAccess(String, String),

    /// Discovery layer: a contact/add message contained a malformed
    /// endpoint description; the specific endpoint is skipped.
    #[error("unreadable endpoint from {0}: {1}")]
    UnreadableEndpoint(String, String),

    /// RPC layer: an argument or return value was neither `int` nor
    /// `string`.
    #[error("unsupported RPC value type: {0}")]
    UnsupportedType(String),

    /// RPC layer: no reply arrived for a request within the caller's
    /// deadline.
    #[error("RPC call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Service container: a required provider does not exist.
    #[error("no provider for service {0}")]
    NoProvider(String),

    /// Service container: a component of this name does not exist.
    #[error("unknown component {0}")]
    UnknownComponent(String),

    /// Service container: a component with this name is already
    /// registered.
    #[error("duplicate component {0}")]
    DuplicateComponent(String),
}

pub type Result<T> = std::result::Result<T, HeraldError>;

/// Utilities mirroring `runar_common::errors::utils`.
pub mod utils {
    /// Render any displayable error as a plain string, for embedding in
    /// JSON payloads (e.g. the debug routing page) without leaking a
    /// concrete error type across a crate boundary.
    pub fn error_to_string(error: impl std::fmt::Display) -> String {
        error.to_string()
    }
}
