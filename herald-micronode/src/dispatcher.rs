// RPC dispatch for a single-threaded peer: looks up the exporting
// component by service-id, invokes the named member synchronously on the
// container, and builds the reply envelope. No bus listener registration
// here — `MicroNode::manage_message` calls this directly from the
// cooperative loop.

use crate::container::MicroContainer;
use herald_common::errors::HeraldError;
use herald_common::rpc::{service_id_from_spec, service_name_from_id, MethodCall, MethodResponse, Value};
use herald_common::types::message::headers;
use herald_common::types::{Content, Endpoint, Message};
use std::collections::HashMap;

/// Maps exported `service_<id>` names to the local component that
/// answers them, and to the spec each name was exported for.
#[derive(Default)]
pub struct MicroDispatcher {
    exports: HashMap<String, String>,
    specs: HashMap<String, String>,
}

impl MicroDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports `component_name`'s `spec` as `service_<id>`, assigning the
    /// id the first time this requirement string is seen in the process.
    pub fn export(&mut self, spec: &str, component_name: impl Into<String>) -> String {
        let service_name = service_name_from_id(service_id_from_spec(spec));
        self.exports.insert(service_name.clone(), component_name.into());
        self.specs.insert(service_name.clone(), spec.to_string());
        service_name
    }

    /// Every exported service whose owning component is currently active,
    /// as the `Endpoint` records advertised over
    /// `herald/rpc/discovery/contact|add`.
    pub fn local_endpoints(&self, local_peer_uid: &str, container: &MicroContainer) -> Vec<Endpoint> {
        self.exports
            .iter()
            .filter(|(_, component_name)| container.is_active(component_name))
            .map(|(service_name, _)| {
                let spec = self.specs.get(service_name).map(String::as_str).unwrap_or_default();
                Endpoint::new(format!("{local_peer_uid}/{service_name}"), local_peer_uid, service_name.clone(), spec)
            })
            .collect()
    }

    /// Handles one inbound `herald/rpc/xmlrpc` message, returning the
    /// reply to send back.
    pub fn handle_request(&self, container: &mut MicroContainer, message: &Message) -> Message {
        let params = match self.dispatch(container, message) {
            Ok(values) => values,
            Err(_) => vec![Value::Str("<unknown>".to_string())],
        };
        let mut reply = Message::new(
            crate::SUBJECT_XMLRPC_REPLY,
            Content::Raw(MethodResponse { params }.encode()),
        );
        reply = reply.with_header(headers::REPLIES_TO, message.uid.as_str().to_string());
        if let Some(sender) = message.sender_uid() {
            reply = reply.with_header(headers::TARGET_PEER, sender.to_string());
        }
        reply
    }

    fn dispatch(&self, container: &mut MicroContainer, message: &Message) -> Result<Vec<Value>, HeraldError> {
        let call = MethodCall::decode(&message.content.as_raw())?;
        let service_id = call.service_id().ok_or_else(|| HeraldError::NoProvider(call.method_name.clone()))?;
        let member = call.member().ok_or_else(|| HeraldError::NoProvider(call.method_name.clone()))?;
        let service_name = format!("service_{service_id}");
        let component_name = self
            .exports
            .get(&service_name)
            .ok_or_else(|| HeraldError::NoProvider(service_name.clone()))?;
        container.dispatch_call(component_name, member, &call.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MicroComponent;

    struct Echo;
    impl MicroComponent for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn provides(&self) -> &[&str] {
            &["pyboard.echo"]
        }
        fn call(&mut self, member: &str, args: &[Value]) -> Result<Vec<Value>, HeraldError> {
            match member {
                "ping" => Ok(args.to_vec()),
                _ => Err(HeraldError::NoProvider(member.to_string())),
            }
        }
    }

    #[test]
    fn exported_component_answers_matching_service_id() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Echo));
        container.start_component("echo");

        let mut dispatcher = MicroDispatcher::new();
        let service_name = dispatcher.export("pyboard.echo", "echo");

        let call = MethodCall {
            method_name: format!("{service_name}.ping"),
            params: vec![Value::Int(42)],
        };
        let request = Message::new(crate::SUBJECT_XMLRPC, Content::Raw(call.encode()));
        let reply = dispatcher.handle_request(&mut container, &request);

        let response = MethodResponse::decode(&reply.content.as_raw()).unwrap();
        assert_eq!(response.params, vec![Value::Int(42)]);
        assert_eq!(reply.replies_to(), Some(request.uid.as_str()));
    }

    #[test]
    fn local_endpoints_only_lists_active_exports() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Echo));
        let mut dispatcher = MicroDispatcher::new();
        dispatcher.export("pyboard.echo", "echo");
        assert!(dispatcher.local_endpoints("micro-1", &container).is_empty());

        container.start_component("echo");
        let endpoints = dispatcher.local_endpoints("micro-1", &container);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].spec(), Some("pyboard.echo"));
    }
}
