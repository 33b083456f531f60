// Peer bean and its JSON dump.

use super::access::AccessDescriptor;
use super::uid::Uid;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Peer {
    pub uid: Uid,
    pub node_name: String,
    pub node_uid: String,
    pub app_id: String,
    pub groups: HashSet<String>,
    pub accesses: HashMap<String, AccessDescriptor>,
}

impl Peer {
    pub fn new(uid: Uid, node_name: impl Into<String>, node_uid: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            uid,
            node_name: node_name.into(),
            node_uid: node_uid.into(),
            app_id: app_id.into(),
            groups: HashSet::new(),
            accesses: HashMap::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn set_access(&mut self, access: AccessDescriptor) {
        self.accesses.insert(access.access_id().to_string(), access);
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Serialize the transport-transparent "peer dump" exchanged during
    /// discovery.
    pub fn dump(&self) -> PeerDump {
        PeerDump {
            uid: self.uid.to_string(),
            name: self.node_name.clone(),
            node_uid: self.node_uid.clone(),
            node_name: self.node_name.clone(),
            app_id: self.app_id.clone(),
            groups: self.groups.iter().cloned().collect(),
            accesses: self
                .accesses
                .iter()
                .map(|(id, access)| (id.clone(), access.dump()))
                .collect(),
        }
    }

    /// Rebuild a `Peer` from a dump plus accesses already loaded by each
    /// transport's directory.
    pub fn from_dump(dump: &PeerDump, accesses: HashMap<String, AccessDescriptor>) -> Self {
        Self {
            uid: Uid::from_raw(dump.uid.clone()),
            node_name: dump.node_name.clone(),
            node_uid: dump.node_uid.clone(),
            app_id: dump.app_id.clone(),
            groups: dump.groups.iter().cloned().collect(),
            accesses,
        }
    }
}

/// Wire form of a peer dump: a flat JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDump {
    pub uid: String,
    pub name: String,
    pub node_uid: String,
    pub node_name: String,
    pub app_id: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub accesses: HashMap<String, serde_json::Value>,
}
