// Blocking RPC proxy.
//
// The source's `RemoteObject.__getattr__` is duck-typed per attribute
// name; this re-architects it as a typed proxy. `RemoteObject` here
// exposes a single `call` entry point, a strongly-typed `RemoteHandle`.

use super::codec::{MethodCall, MethodResponse, Value};
use super::{SUBJECT_XMLRPC, SUBJECT_XMLRPC_REPLY};
use crate::bus::HeraldBus;
use herald_common::errors::HeraldError;
use herald_common::types::message::headers;
use herald_common::types::{Content, Message, Peer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// No timeout exists in the source for RPC calls;
/// this is the bounded default a conforming implementation must supply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<MethodResponse>>>>;

/// Dispatches `herald/rpc/xmlrpc/reply` messages to whichever call is
/// waiting on the matching `replies-to` correlation id. One instance is
/// shared by every `RemoteObject` on a node.
#[derive(Clone)]
pub struct ReplyCorrelator {
    pending: PendingReplies,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn register(&self, request_uid: String) -> oneshot::Receiver<MethodResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_uid, tx);
        rx
    }

    /// Called by the bus listener on `herald/rpc/xmlrpc/reply`: resolves
    /// the waiting call whose request uid equals this message's
    /// `replies-to`.
    pub fn deliver_reply(&self, message: &Message) {
        let Some(correlation) = message.replies_to() else {
            return;
        };
        let Some(tx) = self.pending.lock().unwrap().remove(correlation) else {
            return;
        };
        match MethodResponse::decode(&message.content.as_raw()) {
            Ok(response) => {
                let _ = tx.send(response);
            }
            Err(e) => {
                log::debug!("rpc: malformed reply for {correlation}: {e}");
            }
        }
    }
}

impl Default for ReplyCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Proxy for `(peer_uid, service_name)`.
pub struct RemoteObject {
    peer: Peer,
    service_name: String,
    bus: Arc<HeraldBus>,
    correlator: ReplyCorrelator,
    timeout: Duration,
}

impl RemoteObject {
    pub fn new(peer: Peer, service_name: impl Into<String>, bus: Arc<HeraldBus>, correlator: ReplyCorrelator) -> Self {
        Self {
            peer,
            service_name: service_name.into(),
            bus,
            correlator,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encodes the call, fires it, and blocks until the matching reply
    /// arrives or the timeout elapses.
    pub async fn call(&self, member: &str, args: Vec<Value>) -> Result<Vec<Value>, HeraldError> {
        let method_call = MethodCall {
            method_name: format!("{}.{}", self.service_name, member),
            params: args,
        };
        let mut request = Message::new(SUBJECT_XMLRPC, Content::Raw(method_call.encode()));
        request = request.with_header(headers::TARGET_PEER, self.peer.uid.as_str().to_string());

        let rx = self.correlator.register(request.uid.as_str().to_string());

        self.bus.fire(&self.peer, request).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response.params),
            Ok(Err(_)) => Err(HeraldError::Timeout(self.timeout)),
            Err(_) => Err(HeraldError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_no_pending_call_is_ignored() {
        let correlator = ReplyCorrelator::new();
        let orphan = Message::new(SUBJECT_XMLRPC_REPLY, Content::Raw(MethodResponse { params: vec![] }.encode()))
            .with_header(headers::REPLIES_TO, "no-such-request".to_string());
        correlator.deliver_reply(&orphan);
    }

    #[tokio::test]
    async fn registered_reply_resolves_waiting_receiver() {
        let correlator = ReplyCorrelator::new();
        let rx = correlator.register("req-1".to_string());

        let reply = Message::new(SUBJECT_XMLRPC_REPLY, Content::Raw(MethodResponse { params: vec![Value::Int(1)] }.encode()))
            .with_header(headers::REPLIES_TO, "req-1".to_string());
        correlator.deliver_reply(&reply);

        let response = rx.await.unwrap();
        assert_eq!(response.params, vec![Value::Int(1)]);
    }
}
