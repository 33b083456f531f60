// Subject-based dispatch, reply correlation, transport selection and group
// broadcast.
//
// Grounded on `herald/bus.py`'s `Herald` class: a list of
// `(SubjectFilter, listener)` pairs walked in registration order on every
// inbound message, and a thin `fire`/`fire_group`/`reply` surface over
// whichever transport advertises a matching access for the target peer.

use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::types::message::headers;
use herald_common::types::{Message, MessageReceived, Peer, SubjectFilter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::transport::Transport;

pub type Listener = Arc<dyn Fn(&HeraldBus, &MessageReceived) + Send + Sync>;

struct Registration {
    filter: SubjectFilter,
    listener: Listener,
}

/// The Herald subject bus. Picks a transport per-peer by the order its
/// access-ids were registered.
pub struct HeraldBus {
    local_uid: String,
    transports: Mutex<Vec<Arc<Transport>>>,
    listeners: Mutex<Vec<Registration>>,
    logger: Logger,
}

impl HeraldBus {
    pub fn new(local_uid: impl Into<String>) -> Arc<Self> {
        let local_uid = local_uid.into();
        Arc::new(Self {
            logger: Logger::new_root(Component::Bus, local_uid.clone()),
            local_uid,
            transports: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn register_transport(&self, transport: Arc<Transport>) {
        self.transports.lock().unwrap().push(transport);
    }

    /// Registers a listener invoked with `(bus, message)` for every
    /// inbound message whose subject matches `filter`.
    pub fn listen(&self, filter: SubjectFilter, listener: Listener) {
        self.listeners.lock().unwrap().push(Registration { filter, listener });
    }

    fn transport_for(&self, peer: &Peer) -> Option<Arc<Transport>> {
        self.transports
            .lock()
            .unwrap()
            .iter()
            .find(|t| peer.accesses.contains_key(t.access_id()))
            .cloned()
    }

    /// `fire(peer, message)`: stamp missing headers, pick a
    /// transport advertising an access the peer exposes, invoke its fire.
    pub async fn fire(&self, peer: &Peer, mut message: Message) -> Result<(), HeraldError> {
        message.stamp_outbound(&self.local_uid);
        let transport = self
            .transport_for(peer)
            .ok_or_else(|| HeraldError::NoTransport(peer.uid.as_str().to_string()))?;
        transport.fire(peer, message, &HashMap::new()).await
    }

    /// `fire_group(group, message)`: delegate to each
    /// applicable transport's `fire_group` over the peers in `group`.
    pub async fn fire_group(&self, peers: &[Peer], mut message: Message) -> Vec<String> {
        message.stamp_outbound(&self.local_uid);
        message = message.with_header(headers::GROUP, "1".to_string());

        let mut by_transport: HashMap<String, (Arc<Transport>, Vec<Peer>)> = HashMap::new();
        for peer in peers {
            if let Some(transport) = self.transport_for(peer) {
                by_transport
                    .entry(transport.access_id().to_string())
                    .or_insert_with(|| (transport.clone(), Vec::new()))
                    .1
                    .push(peer.clone());
            } else {
                self.logger
                    .debug(format!("fire_group: no transport for peer {}", peer.uid));
            }
        }

        let mut reached = Vec::new();
        for (_, (transport, group_peers)) in by_transport {
            reached.extend(transport.fire_group(&group_peers, &message).await);
        }
        reached
    }

    /// `reply(original, content, subject)`: `replies-to` is the
    /// original uid, subject defaults to `<original.subject>/reply`,
    /// `target-peer` is the original sender.
    pub fn reply(&self, original: &Message, content: herald_common::types::Content, subject: Option<String>) -> Message {
        let subject = subject.unwrap_or_else(|| format!("{}/reply", original.subject));
        let mut reply = Message::new(subject, content);
        reply = reply.with_header(headers::REPLIES_TO, original.uid.as_str().to_string());
        if let Some(sender) = original.sender_uid() {
            reply = reply.with_header(headers::TARGET_PEER, sender.to_string());
        }
        reply
    }

    /// `handle_message(msg)`: invokes every listener whose
    /// filter matches the subject, in registration order. A listener that
    /// fails does not suppress the others.
    pub fn handle_message(self: &Arc<Self>, received: MessageReceived) {
        let matching: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .iter()
                .filter(|r| r.filter.matches(&received.message.subject))
                .map(|r| r.listener.clone())
                .collect()
        };
        for listener in matching {
            listener(self, &received);
        }
    }
}
