// Local peer table and the three-step discovery handshake.
//
// Grounded on `herald/directory.py`: a `Directory` mapping uid to `Peer`
// plus listener callbacks for registered/updated/unregistered, and
// `herald/discovery.py`'s `PeerContact`, which drives the handshake and
// asks the originating transport to "load" the access dump.

pub mod endpoints;

pub use endpoints::{
    EndpointExchange, SUBJECT_RPC_DISCOVERY_ADD, SUBJECT_RPC_DISCOVERY_CONTACT, SUBJECT_RPC_DISCOVERY_REMOVE,
    SUBJECT_RPC_DISCOVERY_UPDATE,
};

use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::types::{AccessDescriptor, Content, Message, Peer, PeerDump};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const SUBJECT_STEP1: &str = "herald/directory/discovery/step1";
pub const SUBJECT_STEP2: &str = "herald/directory/discovery/step2";
pub const SUBJECT_STEP3: &str = "herald/directory/discovery/step3";

pub trait DirectoryListener: Send + Sync {
    fn peer_registered(&self, _peer: &Peer) {}
    fn peer_updated(&self, _peer: &Peer) {}
    fn peer_unregistered(&self, _uid: &str) {}
}

/// Local table of known peers, plus listener fan-out on register/update/
/// unregister.
pub struct Directory {
    local: Peer,
    peers: Mutex<HashMap<String, Peer>>,
    listeners: Mutex<Vec<Arc<dyn DirectoryListener>>>,
    logger: Logger,
}

impl Directory {
    pub fn new(local: Peer) -> Arc<Self> {
        Arc::new(Self {
            logger: Logger::new_root(Component::Directory, local.uid.to_string()),
            local,
            peers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn local_peer(&self) -> &Peer {
        &self.local
    }

    pub fn add_listener(&self, listener: Arc<dyn DirectoryListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn get(&self, uid: &str) -> Option<Peer> {
        self.peers.lock().unwrap().get(uid).cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.peers.lock().unwrap().contains_key(uid)
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers.lock().unwrap().values().cloned().collect()
    }

    pub fn peers_in_group(&self, group: &str) -> Vec<Peer> {
        self.peers.lock().unwrap().values().filter(|p| p.in_group(group)).cloned().collect()
    }

    /// Registers `peer`, returning `true` if this was a new peer and
    /// `false` if it already existed (the idempotent-duplicate case from
    /// a retried step1).
    fn register(&self, peer: Peer) -> bool {
        let uid = peer.uid.to_string();
        let is_new = {
            let mut peers = self.peers.lock().unwrap();
            let is_new = !peers.contains_key(&uid);
            peers.insert(uid.clone(), peer.clone());
            is_new
        };
        let listeners = self.listeners.lock().unwrap().clone();
        if is_new {
            for l in &listeners {
                l.peer_registered(&peer);
            }
        } else {
            for l in &listeners {
                l.peer_updated(&peer);
            }
        }
        is_new
    }

    pub fn unregister(&self, uid: &str) {
        let removed = self.peers.lock().unwrap().remove(uid).is_some();
        if removed {
            let listeners = self.listeners.lock().unwrap().clone();
            for l in &listeners {
                l.peer_unregistered(uid);
            }
        }
    }
}

/// Loads access dumps by asking the transport that received the frame to
/// splice in transport-specific information (e.g. the MAC the frame
/// arrived on) — access dumps are transport-transparent.
pub trait AccessLoader: Send + Sync {
    fn load(&self, access_id: &str, data: &serde_json::Value, source_address: &str) -> Option<AccessDescriptor>;
}

fn peer_from_dump(dump: &PeerDump, loader: &dyn AccessLoader, access_id: &str, source_address: &str) -> Peer {
    let mut accesses = HashMap::new();
    for (id, data) in &dump.accesses {
        match loader.load(id, data, source_address) {
            Some(access) => {
                accesses.insert(id.clone(), access);
            }
            None => {
                log::debug!("directory: unreadable endpoint access '{id}' from {source_address}");
            }
        }
    }
    if !accesses.contains_key(access_id) {
        if let Some(access) = loader.load(access_id, &serde_json::Value::Null, source_address) {
            accesses.insert(access_id.to_string(), access);
        }
    }
    Peer::from_dump(dump, accesses)
}

/// Drives the three-step discovery handshake.
pub struct PeerContact {
    directory: Arc<Directory>,
    loader: Arc<dyn AccessLoader>,
    logger: Logger,
}

impl PeerContact {
    pub fn new(directory: Arc<Directory>, loader: Arc<dyn AccessLoader>) -> Arc<Self> {
        Arc::new(Self {
            logger: Logger::new_root(Component::Directory, "peer-contact".to_string()),
            directory,
            loader,
        })
    }

    /// Step 1: build the initiator's message carrying its own dump.
    pub fn build_step1(&self) -> Message {
        let dump = serde_json::to_value(self.directory.local_peer().dump()).expect("peer dump always serializes");
        Message::new(SUBJECT_STEP1, Content::Json(dump))
    }

    /// Step 2 (receiver side): registers the initiator if new, replies
    /// with its own dump. Duplicate step1s still get an idempotent step2
    /// reply but do not re-fire notifications, which is
    /// handled by `Directory::register`'s new-vs-update distinction.
    pub fn handle_step1(&self, message: &Message, access_id: &str, source_address: &str) -> Result<Message, HeraldError> {
        let dump: PeerDump = decode_dump(message)?;
        let peer = peer_from_dump(&dump, self.loader.as_ref(), access_id, source_address);
        self.directory.register(peer);

        let local_dump = serde_json::to_value(self.directory.local_peer().dump()).expect("peer dump always serializes");
        Ok(Message::new(SUBJECT_STEP2, Content::Json(local_dump)))
    }

    /// Step 3 (initiator side): registers the receiver; handshake done.
    pub fn handle_step2(&self, message: &Message, access_id: &str, source_address: &str) -> Result<Message, HeraldError> {
        let dump: PeerDump = decode_dump(message)?;
        let peer = peer_from_dump(&dump, self.loader.as_ref(), access_id, source_address);
        self.directory.register(peer);
        Ok(Message::new(SUBJECT_STEP3, Content::Empty))
    }

    /// Step 3 arriving at the receiver: nothing further to register, the
    /// dialog is simply marked complete.
    pub fn handle_step3(&self, _message: &Message) {
        self.logger.debug("handshake complete".to_string());
    }
}

fn decode_dump(message: &Message) -> Result<PeerDump, HeraldError> {
    match &message.content {
        Content::Json(v) => serde_json::from_value(v.clone())
            .map_err(|e| HeraldError::UnreadableEndpoint("peer-dump".to_string(), e.to_string())),
        Content::Raw(s) => serde_json::from_str(s)
            .map_err(|e| HeraldError::UnreadableEndpoint("peer-dump".to_string(), e.to_string())),
        Content::Empty => Err(HeraldError::UnreadableEndpoint(
            "peer-dump".to_string(),
            "empty content".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::Uid;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullLoader;
    impl AccessLoader for NullLoader {
        fn load(&self, _access_id: &str, _data: &serde_json::Value, _source_address: &str) -> Option<AccessDescriptor> {
            None
        }
    }

    struct CountingListener {
        registered: Arc<AtomicUsize>,
        updated: Arc<AtomicUsize>,
    }
    impl DirectoryListener for CountingListener {
        fn peer_registered(&self, _peer: &Peer) {
            self.registered.fetch_add(1, Ordering::SeqCst);
        }
        fn peer_updated(&self, _peer: &Peer) {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn local_peer(uid: &str) -> Peer {
        Peer::new(Uid::from_raw(uid), "node", "node-uid", "app")
    }

    #[test]
    fn three_step_handshake_registers_both_sides() {
        let dir_a = Directory::new(local_peer("A"));
        let dir_b = Directory::new(local_peer("B"));
        let contact_a = PeerContact::new(dir_a.clone(), Arc::new(NullLoader));
        let contact_b = PeerContact::new(dir_b.clone(), Arc::new(NullLoader));

        let step1 = contact_a.build_step1();
        let step2 = contact_b.handle_step1(&step1, "bluetooth", "aa:aa").unwrap();
        assert!(dir_b.contains("A"));

        let step3 = contact_a.handle_step2(&step2, "bluetooth", "bb:bb").unwrap();
        assert!(dir_a.contains("B"));
        assert_eq!(step3.subject, SUBJECT_STEP3);
    }

    #[test]
    fn duplicate_step1_does_not_refire_registration() {
        let dir_b = Directory::new(local_peer("B"));
        let registered = Arc::new(AtomicUsize::new(0));
        let updated = Arc::new(AtomicUsize::new(0));
        dir_b.add_listener(Arc::new(CountingListener {
            registered: registered.clone(),
            updated: updated.clone(),
        }));
        let contact_b = PeerContact::new(dir_b.clone(), Arc::new(NullLoader));

        let dir_a = Directory::new(local_peer("A"));
        let contact_a = PeerContact::new(dir_a, Arc::new(NullLoader));
        let step1 = contact_a.build_step1();

        contact_b.handle_step1(&step1, "bluetooth", "aa:aa").unwrap();
        contact_b.handle_step1(&step1, "bluetooth", "aa:aa").unwrap();

        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert_eq!(updated.load(Ordering::SeqCst), 1);
    }
}
