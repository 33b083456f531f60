// Server side of the RPC dispatch: looks up the component by
// service-id, invokes the named member with positional args, replies with
// an int/string list.

use super::codec::{MethodCall, MethodResponse, Value};
use super::{SUBJECT_XMLRPC, SUBJECT_XMLRPC_REPLY};
use crate::bus::HeraldBus;
use crate::container::Container;
use herald_common::errors::HeraldError;
use herald_common::types::message::headers;
use herald_common::types::{Content, Message, MessageReceived, Peer};
use std::sync::Arc;

/// Answers incoming `herald/rpc/xmlrpc` requests by resolving the
/// service-id against the container's active components and invoking
/// their `call` hook, the way `MicroDispatcher` resolves into
/// `MicroContainer::dispatch_call`.
pub struct Dispatcher {
    container: Arc<Container>,
}

impl Dispatcher {
    pub fn new(container: Arc<Container>) -> Arc<Self> {
        Arc::new(Self { container })
    }

    /// Handles one inbound `herald/rpc/xmlrpc` message and returns the
    /// reply message to send back.
    pub fn handle_request(&self, message: &Message) -> Message {
        let reply_subject = SUBJECT_XMLRPC_REPLY.to_string();
        let result = self.dispatch(message);
        let params = match result {
            Ok(values) => values,
            Err(_) => vec![Value::Str("<unknown>".to_string())],
        };
        let mut reply = Message::new(reply_subject, Content::Raw(MethodResponse { params }.encode()));
        reply = reply.with_header(headers::REPLIES_TO, message.uid.as_str().to_string());
        if let Some(sender) = message.sender_uid() {
            reply = reply.with_header(headers::TARGET_PEER, sender.to_string());
        }
        reply
    }

    fn dispatch(&self, message: &Message) -> Result<Vec<Value>, HeraldError> {
        let call = MethodCall::decode(&message.content.as_raw())?;
        let service_id = call
            .service_id()
            .ok_or_else(|| HeraldError::NoProvider(call.method_name.clone()))?;
        let member = call
            .member()
            .ok_or_else(|| HeraldError::NoProvider(call.method_name.clone()))?;

        self.container.dispatch_call(service_id, member, &call.params)
    }

    /// Listens on the bus for `herald/rpc/xmlrpc` and fires the reply back
    /// to the originating peer.
    pub fn attach(self: &Arc<Self>, bus: Arc<HeraldBus>, directory_lookup: Arc<dyn Fn(&str) -> Option<Peer> + Send + Sync>) {
        let dispatcher = self.clone();
        let owned_bus = bus.clone();
        bus.listen(
            herald_common::types::SubjectFilter::new(vec![SUBJECT_XMLRPC.to_string()]),
            Arc::new(move |_bus, received: &MessageReceived| {
                let reply = dispatcher.handle_request(&received.message);
                let Some(sender) = received.message.sender_uid() else {
                    return;
                };
                let Some(peer) = directory_lookup(sender) else {
                    return;
                };
                let bus = owned_bus.clone();
                tokio::spawn(async move {
                    if let Err(e) = bus.fire(&peer, reply).await {
                        log::debug!("rpc: failed to send reply: {e}");
                    }
                });
            }),
        );
    }
}
