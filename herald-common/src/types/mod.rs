pub mod access;
pub mod endpoint;
pub mod message;
pub mod peer;
pub mod subject_filter;
pub mod uid;

pub use access::{AccessDescriptor, BluetoothAccess};
pub use endpoint::Endpoint;
pub use message::{Content, Message, MessageReceived};
pub use peer::{Peer, PeerDump};
pub use subject_filter::SubjectFilter;
pub use uid::Uid;
