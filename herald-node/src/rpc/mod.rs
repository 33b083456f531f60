// RPC dispatcher + blocking proxy, built on the codec shared with the
// micronode crate.

pub mod dispatcher;
pub mod remote_object;

pub use dispatcher::Dispatcher;
pub use herald_common::rpc::codec;
pub use herald_common::rpc::{MethodCall, MethodResponse, Value, SUBJECT_XMLRPC, SUBJECT_XMLRPC_REPLY};
pub use remote_object::{RemoteObject, ReplyCorrelator};
