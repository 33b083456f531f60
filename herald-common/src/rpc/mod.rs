//! XML-RPC-restricted-to-int/string codec shared by the host node's
//! dispatcher/proxy and the micronode's synchronous equivalents.

pub mod codec;
pub mod service_id;

pub use codec::{MethodCall, MethodResponse, Value};
pub use service_id::{service_id_from_spec, service_name_from_id};

pub const SUBJECT_XMLRPC: &str = "herald/rpc/xmlrpc";
pub const SUBJECT_XMLRPC_REPLY: &str = "herald/rpc/xmlrpc/reply";
