//! Shared wire types, the frame codec, the error taxonomy and the logging
//! facade used by every Herald crate (host node, gateway, micronode).

pub mod errors;
pub mod logging;
pub mod rpc;
pub mod types;
pub mod wire;

pub use errors::HeraldError;
pub use logging::{Component, Logger, LoggingContext};
