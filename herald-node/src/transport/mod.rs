// Per-access-id transport: wraps device discovery and a
// LinkSet, fires step-1 discovery to newly-seen devices, and on the
// inbound path stamps `access`/`extra` before routing to the directory or
// the bus.
//
// Grounded on `herald/transports/bluetooth/transport.py`: the split
// between an external `DeviceDiscovery` collaborator and a `Transport`
// that only reacts to its new/removed callbacks.

pub mod discovery;

use crate::link_set::LinkSet;
use discovery::DeviceDiscovery;
use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::types::message::headers;
use herald_common::types::{AccessDescriptor, Message, MessageReceived, Peer};
use std::collections::HashMap;
use std::sync::Arc;

pub type InboundHandler = Arc<dyn Fn(MessageReceived) + Send + Sync>;

/// One transport instance, identified by `access_id` (e.g. `"bluetooth"`).
pub struct Transport {
    access_id: String,
    link_set: Arc<LinkSet>,
    logger: Logger,
    on_inbound: InboundHandler,
}

impl Transport {
    pub fn new(access_id: impl Into<String>, link_set: Arc<LinkSet>, on_inbound: InboundHandler) -> Arc<Self> {
        let access_id = access_id.into();
        Arc::new(Self {
            logger: Logger::new_root(Component::Transport, access_id.clone()),
            access_id,
            link_set,
            on_inbound,
        })
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    /// Resolves the destination address for `peer`: `extra["<access-id>"]`
    /// if present, else the peer's access descriptor for this access-id.
    fn resolve_address(&self, peer: &Peer, extra: &HashMap<String, String>) -> Option<String> {
        if let Some(addr) = extra.get(&self.access_id) {
            return Some(addr.clone());
        }
        match peer.accesses.get(&self.access_id)? {
            AccessDescriptor::Bluetooth(bt) => Some(bt.mac.clone()),
            AccessDescriptor::Opaque { data, .. } => data.as_str().map(|s| s.to_string()),
        }
    }

    /// `fire(peer, message, extra)`: stamps `original-sender`
    /// if missing and hands the message to the link set.
    pub async fn fire(
        &self,
        peer: &Peer,
        mut message: Message,
        extra: &HashMap<String, String>,
    ) -> Result<(), HeraldError> {
        let address = self
            .resolve_address(peer, extra)
            .ok_or_else(|| HeraldError::NoTransport(peer.uid.as_str().to_string()))?;
        if message.header(headers::ORIGINAL_SENDER).is_none() {
            message = message.with_header(headers::ORIGINAL_SENDER, message.uid.as_str().to_string());
        }
        self.link_set.send_to(&address, &message).await
    }

    /// `fire_group(group, peers, message)`: best-effort; the
    /// returned reached-set is the input peer list regardless of per-peer
    /// failures.
    pub async fn fire_group(&self, peers: &[Peer], message: &Message) -> Vec<String> {
        let mut reached = Vec::with_capacity(peers.len());
        for peer in peers {
            if let Err(e) = self.fire(peer, message.clone(), &HashMap::new()).await {
                self.logger
                    .debug(format!("fire_group: peer {} unreachable: {e}", peer.uid));
            }
            reached.push(peer.uid.as_str().to_string());
        }
        reached
    }

    /// Called by the device-discovery loop when a new device address
    /// appears: fires a step-1 discovery message carrying `local_dump`.
    /// Transient errors are logged, not propagated.
    pub async fn on_new_device(&self, address: &str, local_dump: &Message) {
        let mut msg = local_dump.clone();
        msg = msg.with_header("herald-access", self.access_id.clone());
        let link = self.link_set.update(address);
        if let Err(e) = link.send(&msg).await {
            self.logger.debug(format!("step1 to {address} failed: {e}"));
        }
    }

    /// Inbound dispatch entry point: stamps `access`, attaches
    /// the source address as `extra["<access-id>"]`, and routes discovery
    /// subjects separately from this call site's caller (the caller
    /// decides discovery vs. bus based on subject prefix).
    pub fn deliver(&self, message: Message, source_address: String) {
        let mut extra = HashMap::new();
        extra.insert(self.access_id.clone(), source_address);
        let received = MessageReceived {
            message,
            access: self.access_id.clone(),
            extra,
        };
        (self.on_inbound)(received);
    }

    pub fn run_discovery(
        self: Arc<Self>,
        discovery: Arc<dyn DeviceDiscovery>,
        local_dump: Message,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let transport = self;
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            discovery.listen_new(Arc::new(move |addr| {
                let _ = tx.send(addr);
            }));
            while let Some(addr) = rx.recv().await {
                transport.on_new_device(&addr, &local_dump).await;
            }
        })
    }
}
