//! Herald host-side runtime: the link layer, the transport that opens
//! links on demand, the subject bus, the peer directory, the
//! distance-vector router and the service container.

pub mod bus;
pub mod container;
pub mod directory;
pub mod link;
pub mod link_set;
pub mod node;
pub mod router;
pub mod rpc;
pub mod transport;

pub use link::{ByteStream, Connector, Link, LinkConfig, LinkState};
pub use link_set::LinkSet;
pub use node::{Node, NodeConfig};
