//! Standalone debug HTTP server binary, serving the routing status page
//! for a node constructed elsewhere in-process. Intended to be embedded
//! rather than run bare; this binary exists for manual smoke-testing the
//! route table against a node with no live transports.

use herald_common::types::{AccessDescriptor, Peer, Uid};
use herald_node::directory::AccessLoader;
use herald_node::node::NodeConfig;
use herald_node::{ByteStream, Connector, Node};
use std::sync::Arc;

struct NoopConnector;

#[async_trait::async_trait]
impl Connector for NoopConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn ByteStream>, herald_common::errors::HeraldError> {
        Err(herald_common::errors::HeraldError::NoTransport(address.to_string()))
    }
}

struct NullLoader;
impl AccessLoader for NullLoader {
    fn load(&self, _access_id: &str, _data: &serde_json::Value, _source_address: &str) -> Option<AccessDescriptor> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let local = Peer::new(Uid::new_random(), "gateway-demo", "node-1", "herald");
    let node = Node::new(
        local,
        vec![("bluetooth".to_string(), Arc::new(NoopConnector) as Arc<dyn Connector>)],
        Arc::new(NullLoader),
        NodeConfig::default(),
    );
    node.spawn_routing();

    let app = herald_gateway::routing_app(node);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    log::info!("routing status page on http://0.0.0.0:8080/routing");
    axum::serve(listener, app).await?;
    Ok(())
}
