// Top-level wiring: ties the link set, bus, directory, routers and
// container together into one running peer.

use crate::bus::HeraldBus;
use crate::container::Container;
use crate::directory::{
    AccessLoader, Directory, EndpointExchange, PeerContact, SUBJECT_RPC_DISCOVERY_ADD, SUBJECT_RPC_DISCOVERY_CONTACT,
    SUBJECT_RPC_DISCOVERY_REMOVE, SUBJECT_RPC_DISCOVERY_UPDATE, SUBJECT_STEP1, SUBJECT_STEP2, SUBJECT_STEP3,
};
use crate::link::{Connector, LinkConfig};
use crate::link_set::LinkSet;
use crate::router::hellos::{RouterTag, SUBJECT_HELLO, SUBJECT_REPLY_PREFIX};
use crate::router::roads::SUBJECT_ROADS;
use crate::router::{HelloRouter, RoadsRouter};
use crate::rpc::{Dispatcher, ReplyCorrelator, SUBJECT_XMLRPC_REPLY};
use crate::transport::Transport;
use herald_common::logging::{Component, Logger};
use herald_common::types::{Content, Message, MessageReceived, Peer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tunables, each with the production default from the reference config.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub hello_delay: Duration,
    pub hello_timeout: Duration,
    pub metric_granularity: f64,
    pub road_delay: Duration,
    pub link: LinkConfig,
    pub router_tag: RouterTag,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hello_delay: Duration::from_secs(5),
            hello_timeout: Duration::from_secs(12),
            metric_granularity: 0.00003,
            road_delay: Duration::from_secs(5),
            link: LinkConfig::default(),
            router_tag: RouterTag::Node,
        }
    }
}

/// One running Herald host peer.
pub struct Node {
    pub directory: Arc<Directory>,
    pub bus: Arc<HeraldBus>,
    pub link_set: Arc<LinkSet>,
    pub container: Arc<Container>,
    pub hellos: Arc<HelloRouter>,
    pub roads: Arc<RoadsRouter>,
    pub peer_contact: Arc<PeerContact>,
    pub endpoint_exchange: Arc<EndpointExchange>,
    pub dispatcher: Arc<Dispatcher>,
    pub reply_correlator: ReplyCorrelator,
    logger: Logger,
}

impl Node {
    /// `accesses` is one `(access_id, connector)` pair per transport this
    /// node exposes.
    pub fn new(
        local: Peer,
        accesses: Vec<(String, Arc<dyn Connector>)>,
        access_loader: Arc<dyn AccessLoader>,
        config: NodeConfig,
    ) -> Arc<Self> {
        let local_uid = local.uid.to_string();
        let directory = Directory::new(local);
        let bus = HeraldBus::new(local_uid.clone());
        let container = Container::new();
        let hellos = Arc::new(HelloRouter::new(
            config.router_tag,
            config.hello_delay,
            config.hello_timeout,
            config.metric_granularity,
        ));
        let roads = Arc::new(RoadsRouter::new(config.road_delay));
        let peer_contact = PeerContact::new(directory.clone(), access_loader);
        let endpoint_exchange = EndpointExchange::new(container.clone(), local_uid.clone());
        let dispatcher = Dispatcher::new(container.clone());
        let reply_correlator = ReplyCorrelator::new();

        let mut first_link_set = None;
        for (access_id, connector) in accesses {
            let bus_for_inbound = bus.clone();
            let directory_for_inbound = directory.clone();
            let peer_contact_for_inbound = peer_contact.clone();
            let endpoint_exchange_for_inbound = endpoint_exchange.clone();
            let reply_correlator_for_inbound = reply_correlator.clone();
            let hellos_for_inbound = hellos.clone();
            let roads_for_inbound = roads.clone();
            let on_inbound: crate::transport::InboundHandler = Arc::new(move |received: MessageReceived| {
                route_inbound(
                    &received,
                    &bus_for_inbound,
                    &directory_for_inbound,
                    &peer_contact_for_inbound,
                    &endpoint_exchange_for_inbound,
                    &reply_correlator_for_inbound,
                    &hellos_for_inbound,
                    &roads_for_inbound,
                );
            });

            // `Transport` needs a `LinkSet` to send through, and the
            // `LinkSet`'s inbound callback needs to route through
            // `Transport::deliver` to stamp `access`/`extra` first — fill
            // the slot once the transport exists.
            let transport_slot: Arc<std::sync::OnceLock<Arc<Transport>>> = Arc::new(std::sync::OnceLock::new());
            let slot_for_callback = transport_slot.clone();
            let link_set = LinkSet::new(
                connector,
                config.link.clone(),
                Arc::new(|_addr| {}),
                Arc::new(|_addr| {}),
                Arc::new(move |message, address| {
                    if let Some(transport) = slot_for_callback.get() {
                        transport.deliver(message, address);
                    }
                }),
            );
            let transport = Transport::new(access_id, link_set.clone(), on_inbound);
            let _ = transport_slot.set(transport.clone());
            bus.register_transport(transport);
            first_link_set.get_or_insert(link_set);
        }

        let node = Arc::new(Self {
            logger: Logger::new_root(Component::Node, local_uid),
            directory,
            bus,
            link_set: first_link_set.expect("a node needs at least one transport"),
            container,
            hellos,
            roads,
            peer_contact,
            endpoint_exchange,
            dispatcher,
            reply_correlator,
        });

        node.dispatcher.attach(node.bus.clone(), {
            let directory = node.directory.clone();
            Arc::new(move |uid: &str| directory.get(uid))
        });

        node
    }

    /// Distance-vector `next_hop_to`, combining the hello and
    /// roads tables the way the router periodic loops do internally.
    pub fn next_hop_to(&self, destination: &str) -> Option<String> {
        self.roads.next_hop_to(destination, &self.hellos)
    }

    /// Spawns the two router periodic units.
    pub fn spawn_routing(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let hello_task = {
            let node = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(node.hellos.hello_delay());
                loop {
                    interval.tick().await;
                    for peer in node.directory.peers() {
                        let uid = peer.uid.to_string();
                        if node.hellos.is_awaiting_reply(&uid) {
                            continue;
                        }
                        let hello = node.hellos.send_hello(&uid);
                        let _ = node.bus.fire(&peer, hello).await;
                    }
                    node.hellos.expire_stale();
                }
            })
        };

        let roads_task = {
            let node = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(node.roads.road_delay());
                loop {
                    interval.tick().await;
                    for uid in node.hellos.router_neighbours() {
                        let Some(peer) = node.directory.get(&uid) else {
                            continue;
                        };
                        let advertisement = node.roads.build_advertisement(&uid, &node.hellos);
                        let content = serde_json::to_value(&advertisement).unwrap_or(serde_json::Value::Null);
                        let message = Message::new(SUBJECT_ROADS, Content::Json(content));
                        let _ = node.bus.fire(&peer, message).await;
                    }
                }
            })
        };

        (hello_task, roads_task)
    }

    pub async fn shutdown(&self) {
        self.logger.info("shutting down".to_string());
        self.link_set.close_all().await;
    }
}

#[allow(clippy::too_many_arguments)]
fn route_inbound(
    received: &MessageReceived,
    bus: &Arc<HeraldBus>,
    directory: &Arc<Directory>,
    peer_contact: &Arc<PeerContact>,
    endpoint_exchange: &Arc<EndpointExchange>,
    reply_correlator: &ReplyCorrelator,
    hellos: &Arc<HelloRouter>,
    roads: &Arc<RoadsRouter>,
) {
    let subject = received.message.subject.as_str();
    let source_address = received
        .extra
        .values()
        .next()
        .map(|s| s.as_str())
        .unwrap_or_default();

    if subject == SUBJECT_HELLO {
        if let Some(sender) = received.message.sender_uid() {
            let reply = hellos.build_reply();
            if let Some(peer) = directory.get(sender) {
                let bus = bus.clone();
                tokio::spawn(async move {
                    let _ = bus.fire(&peer, reply).await;
                });
            }
        }
        return;
    }
    if let Some(sender) = received.message.sender_uid() {
        if subject.starts_with(SUBJECT_REPLY_PREFIX) {
            hellos.handle_reply(sender, subject);
            return;
        }
        if subject == SUBJECT_ROADS {
            let advertisement: HashMap<String, f64> = match &received.message.content {
                Content::Json(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
                Content::Raw(s) => serde_json::from_str(s).unwrap_or_default(),
                Content::Empty => HashMap::new(),
            };
            roads.handle_advertisement(sender, &advertisement, hellos);
            return;
        }
    }

    match subject {
        SUBJECT_STEP1 => {
            if let Ok(step2) = peer_contact.handle_step1(&received.message, &received.access, source_address) {
                if let Some(sender) = received.message.sender_uid() {
                    if let Some(peer) = directory.get(sender) {
                        let bus = bus.clone();
                        tokio::spawn(async move {
                            let _ = bus.fire(&peer, step2).await;
                        });
                    }
                }
            }
        }
        SUBJECT_STEP2 => {
            if let Ok(step3) = peer_contact.handle_step2(&received.message, &received.access, source_address) {
                if let Some(sender) = received.message.sender_uid() {
                    if let Some(peer) = directory.get(sender) {
                        let bus = bus.clone();
                        let contact = endpoint_exchange.build_contact();
                        tokio::spawn(async move {
                            let _ = bus.fire(&peer, step3).await;
                            let _ = bus.fire(&peer, contact).await;
                        });
                    }
                }
            }
        }
        SUBJECT_STEP3 => {
            peer_contact.handle_step3(&received.message);
            if let Some(sender) = received.message.sender_uid() {
                if let Some(peer) = directory.get(sender) {
                    let bus = bus.clone();
                    let contact = endpoint_exchange.build_contact();
                    tokio::spawn(async move {
                        let _ = bus.fire(&peer, contact).await;
                    });
                }
            }
        }
        SUBJECT_RPC_DISCOVERY_CONTACT => {
            if let Some(sender) = received.message.sender_uid() {
                if let Ok(add) = endpoint_exchange.handle_contact(&received.message, sender) {
                    if let Some(peer) = directory.get(sender) {
                        let bus = bus.clone();
                        tokio::spawn(async move {
                            let _ = bus.fire(&peer, add).await;
                        });
                    }
                }
            }
        }
        SUBJECT_RPC_DISCOVERY_ADD => {
            if let Some(sender) = received.message.sender_uid() {
                let _ = endpoint_exchange.handle_add(&received.message, sender);
            }
        }
        SUBJECT_RPC_DISCOVERY_UPDATE => {
            if let Some(sender) = received.message.sender_uid() {
                let _ = endpoint_exchange.handle_update(&received.message, sender);
            }
        }
        SUBJECT_RPC_DISCOVERY_REMOVE => {
            if let Some(sender) = received.message.sender_uid() {
                let _ = endpoint_exchange.handle_remove(&received.message, sender);
            }
        }
        SUBJECT_XMLRPC_REPLY => reply_correlator.deliver_reply(&received.message),
        _ => bus.handle_message(received.clone()),
    }
}
