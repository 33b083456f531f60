// Endpoint contact/add/update/remove exchange, following the discovery
// handshake.
//
// Grounded on `herald/remote/discovery.py`'s post-handshake endpoint
// advertisement pass: once a peer is registered, advertise the locally
// active exported services and fold whatever the remote peer advertises
// back into the service container — the same shape as `PeerContact`'s
// dump exchange, one step later in the dialog.

use crate::container::Container;
use herald_common::errors::HeraldError;
use herald_common::types::{Content, Endpoint, Message};
use std::sync::Arc;

pub const SUBJECT_RPC_DISCOVERY_CONTACT: &str = "herald/rpc/discovery/contact";
pub const SUBJECT_RPC_DISCOVERY_ADD: &str = "herald/rpc/discovery/add";
pub const SUBJECT_RPC_DISCOVERY_UPDATE: &str = "herald/rpc/discovery/update";
pub const SUBJECT_RPC_DISCOVERY_REMOVE: &str = "herald/rpc/discovery/remove";

/// Decodes/encodes `Vec<Endpoint>` message bodies and folds them into the
/// local `Container`'s `external_services` table.
pub struct EndpointExchange {
    container: Arc<Container>,
    local_peer_uid: String,
}

impl EndpointExchange {
    pub fn new(container: Arc<Container>, local_peer_uid: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            container,
            local_peer_uid: local_peer_uid.into(),
        })
    }

    fn local_endpoints(&self) -> Vec<Endpoint> {
        self.container.local_endpoints(&self.local_peer_uid)
    }

    /// Initiator side: advertise whatever this peer currently exports.
    pub fn build_contact(&self) -> Message {
        Message::new(SUBJECT_RPC_DISCOVERY_CONTACT, encode(&self.local_endpoints()))
    }

    /// Receiver side of `contact`: records the sender's endpoints, replies
    /// with `add` carrying the local ones.
    pub fn handle_contact(&self, message: &Message, sender: &str) -> Result<Message, HeraldError> {
        self.register_remote(message, sender)?;
        Ok(Message::new(SUBJECT_RPC_DISCOVERY_ADD, encode(&self.local_endpoints())))
    }

    pub fn handle_add(&self, message: &Message, sender: &str) -> Result<(), HeraldError> {
        self.register_remote(message, sender)
    }

    pub fn handle_update(&self, message: &Message, sender: &str) -> Result<(), HeraldError> {
        self.register_remote(message, sender)
    }

    /// `remove` carries the uids of endpoints going away; any requirement
    /// bound to them is released (cascading per `Container::remove_service`).
    pub fn handle_remove(&self, message: &Message, sender: &str) -> Result<(), HeraldError> {
        for endpoint in decode(message)? {
            if let Some(spec) = endpoint.spec() {
                self.container.remove_service(spec, sender);
            }
        }
        Ok(())
    }

    fn register_remote(&self, message: &Message, sender: &str) -> Result<(), HeraldError> {
        for endpoint in decode(message)? {
            if let Some(spec) = endpoint.spec() {
                self.container.add_service(spec, sender, &endpoint.name);
            }
        }
        Ok(())
    }
}

fn encode(endpoints: &[Endpoint]) -> Content {
    Content::Json(serde_json::to_value(endpoints).expect("endpoint list always serializes"))
}

/// A malformed envelope (not a JSON array at all) fails the whole batch;
/// a malformed individual endpoint inside an otherwise-valid array is
/// skipped and logged, letting the others through.
fn decode(message: &Message) -> Result<Vec<Endpoint>, HeraldError> {
    let value = match &message.content {
        Content::Json(v) => v.clone(),
        Content::Raw(s) => serde_json::from_str(s)
            .map_err(|e| HeraldError::UnreadableEndpoint("endpoint-list".to_string(), e.to_string()))?,
        Content::Empty => return Ok(Vec::new()),
    };
    let items: Vec<serde_json::Value> = serde_json::from_value(value)
        .map_err(|e| HeraldError::UnreadableEndpoint("endpoint-list".to_string(), e.to_string()))?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Endpoint>(item) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                log::debug!("endpoint-exchange: skipping malformed endpoint: {e}");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ComponentSpec;

    #[test]
    fn contact_then_add_registers_endpoints_on_both_sides() {
        let container_a = Container::new();
        container_a.register(ComponentSpec::new("led-a").provides("led.on"));
        container_a.start_component("led-a");
        let exchange_a = EndpointExchange::new(container_a, "peer-a");

        let container_b = Container::new();
        container_b.register(ComponentSpec::new("consumer").requires("led.on", false));
        let exchange_b = EndpointExchange::new(container_b.clone(), "peer-b");

        let contact = exchange_a.build_contact();
        let add = exchange_b.handle_contact(&contact, "peer-a").unwrap();
        assert!(container_b.is_active("consumer"));

        assert_eq!(add.subject, SUBJECT_RPC_DISCOVERY_ADD);
        exchange_a.handle_add(&add, "peer-b").unwrap();
    }

    #[test]
    fn remove_cascades_through_non_optional_consumer() {
        let container = Container::new();
        container.register(ComponentSpec::new("consumer").requires("led.on", false));
        let exchange = EndpointExchange::new(container.clone(), "peer-b");

        let endpoint = Endpoint::new("e1", "peer-a", "service_1", "led.on");
        let add = Message::new(SUBJECT_RPC_DISCOVERY_ADD, encode(&[endpoint.clone()]));
        exchange.handle_add(&add, "peer-a").unwrap();
        assert!(container.is_active("consumer"));

        let remove = Message::new(SUBJECT_RPC_DISCOVERY_REMOVE, encode(&[endpoint]));
        exchange.handle_remove(&remove, "peer-a").unwrap();
        assert!(!container.is_active("consumer"));
    }

    #[test]
    fn malformed_endpoint_is_skipped_without_failing_the_batch() {
        let container = Container::new();
        let exchange = EndpointExchange::new(container, "peer-b");
        let good = Endpoint::new("e1", "peer-a", "service_1", "led.on");
        let mut items = serde_json::to_value(&[good]).unwrap();
        items.as_array_mut().unwrap().push(serde_json::json!({"not": "an endpoint"}));
        let add = Message::new(SUBJECT_RPC_DISCOVERY_ADD, Content::Json(items));
        assert!(exchange.handle_add(&add, "peer-a").is_ok());
    }
}
