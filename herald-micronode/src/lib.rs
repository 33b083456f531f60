//! Single-threaded, cooperatively scheduled Herald peer for a
//! microcontroller-class device: one UART, no OS threads, no locks.
//!
//! Grounded on `pyboard/main.py`/`herald.py`: the same message and RPC
//! wire formats as a host peer (reused directly from `herald_common`),
//! with the service container's bind/unbind folded into a synchronous
//! call and the blocking RPC proxy re-entering the cooperative loop
//! instead of parking a thread.

pub mod container;
pub mod dispatcher;
pub mod directory;
pub mod identity;
pub mod node;
pub mod uart;

pub use container::{MicroComponent, MicroContainer, RemoteHandle};
pub use dispatcher::MicroDispatcher;
pub use identity::gen_uid;
pub use node::MicroNode;
pub use uart::{BufferUart, Uart};

pub use herald_common::rpc::{SUBJECT_XMLRPC, SUBJECT_XMLRPC_REPLY};

pub const SUBJECT_ROUTING_HELLO: &str = "herald/routing/hello/";
pub const SUBJECT_ROUTING_REPLY_N: &str = "herald/routing/reply/N/";
