// Discovery handshake replies for a peer with no directory of its own.
//
// Grounded on `pyboard/herald.py`'s `get_step2_response`/`get_step3_response`:
// the micronode never keeps a peer table — every step1 gets an
// unconditional step2 reply carrying its own dump, and every step3
// (or rpc/discovery/contact|add) gets a fresh list of its exported
// services. `Peer::dump`/`PeerDump` replace the source's hand-assembled
// compressed JSON literal.

use herald_common::types::{AccessDescriptor, BluetoothAccess, Content, Endpoint, Message, Peer};

pub const SUBJECT_STEP1: &str = "herald/directory/discovery/step1";
pub const SUBJECT_STEP2: &str = "herald/directory/discovery/step2";
pub const SUBJECT_STEP3: &str = "herald/directory/discovery/step3";
pub const SUBJECT_RPC_DISCOVERY_CONTACT: &str = "herald/rpc/discovery/contact";
pub const SUBJECT_RPC_DISCOVERY_ADD: &str = "herald/rpc/discovery/add";
pub const SUBJECT_RPC_DISCOVERY_UPDATE: &str = "herald/rpc/discovery/update";
pub const SUBJECT_RPC_DISCOVERY_REMOVE: &str = "herald/rpc/discovery/remove";

/// Builds the local peer's own identity: one bluetooth access, no known
/// groups beyond the default one.
pub fn local_peer(uid: herald_common::types::Uid, mac: impl Into<String>, app_id: impl Into<String>) -> Peer {
    let node_name = uid.to_string();
    let mut peer = Peer::new(uid.clone(), node_name.clone(), uid.to_string(), app_id);
    peer.set_access(AccessDescriptor::Bluetooth(BluetoothAccess::new(mac.into(), Some(node_name))));
    peer
}

/// Step2 reply to an inbound step1: the micronode's own dump, serialized
/// as the compact string its content field carries (micronode messages
/// are never the JSON-typed-tree variant).
pub fn build_step2(local: &Peer, request: &Message) -> Message {
    let dump = serde_json::to_string(&local.dump()).expect("peer dump always serializes");
    let mut reply = Message::new(SUBJECT_STEP2, Content::Raw(dump));
    reply.headers.insert(
        herald_common::types::message::headers::REPLIES_TO.to_string(),
        request.uid.as_str().to_string(),
    );
    reply
}

/// Step3 acknowledgement: nothing to register on this side, just marks
/// the handshake complete.
pub fn build_step3(request: &Message) -> Message {
    let mut reply = Message::new(SUBJECT_STEP3, Content::Empty);
    reply.headers.insert(
        herald_common::types::message::headers::REPLIES_TO.to_string(),
        request.uid.as_str().to_string(),
    );
    reply
}

/// Builds a `contact`/`add` envelope carrying this peer's currently
/// exported endpoints, as the compact string every micronode message
/// content uses.
pub fn build_endpoint_message(subject: &str, endpoints: &[Endpoint]) -> Message {
    let body = serde_json::to_string(endpoints).expect("endpoint list always serializes");
    Message::new(subject, Content::Raw(body))
}

/// Decodes an endpoint-list message body, skipping individual endpoints
/// that fail to parse rather than discarding the whole batch (mirrors the
/// host-side `EndpointExchange::handle_*` tolerance).
pub fn decode_endpoints(message: &Message) -> Vec<Endpoint> {
    let raw = message.content.as_raw();
    let items: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    items.into_iter().filter_map(|item| serde_json::from_value::<Endpoint>(item).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::Uid;

    #[test]
    fn step2_reply_carries_own_dump_and_correlates_to_request() {
        let local = local_peer(Uid::from_raw("micro-1"), "20:14:03:19:88:23", "<herald-legacy>");
        let step1 = Message::new(SUBJECT_STEP1, Content::Empty);
        let reply = build_step2(&local, &step1);

        assert_eq!(reply.subject, SUBJECT_STEP2);
        assert_eq!(reply.replies_to(), Some(step1.uid.as_str()));
        assert!(reply.content.as_raw().contains("micro-1"));
    }
}
