// The cooperative loop itself: one UART, one frame/message codec, one
// container, no threads, no locks.
//
// Grounded on `pyboard/main.py`'s `main()`/`manage_message`/
// `extract_herald_message`: pull whatever bytes are on the wire, feed the
// reader, dispatch by subject if a complete message fell out, then give
// every active component a chance to run. `wait_for_message` is modeled
// as `call_remote`'s bounded pump loop rather than a generator: there is
// no coroutine primitive to re-enter on this side, so the loop is made
// explicit.

use crate::container::MicroContainer;
use crate::dispatcher::MicroDispatcher;
use crate::directory;
use crate::uart::Uart;
use herald_common::errors::HeraldError;
use herald_common::types::message::headers;
use herald_common::types::{Content, Message, Peer};
use herald_common::wire::{encode_hello, encode_message, MessageReader, WireEvent};
use herald_common::rpc::{MethodCall, MethodResponse, Value};
use std::time::Duration;

use crate::{SUBJECT_ROUTING_HELLO, SUBJECT_ROUTING_REPLY_N, SUBJECT_XMLRPC, SUBJECT_XMLRPC_REPLY};

/// One microcontroller-class Herald peer.
pub struct MicroNode<U: Uart> {
    pub local: Peer,
    pub container: MicroContainer,
    dispatcher: MicroDispatcher,
    reader: MessageReader,
    uart: U,
}

impl<U: Uart> MicroNode<U> {
    pub fn new(local: Peer, uart: U) -> Self {
        Self {
            local,
            container: MicroContainer::new(),
            dispatcher: MicroDispatcher::new(),
            reader: MessageReader::new(),
            uart,
        }
    }

    /// Exports `component_name`'s `spec` over RPC, returning the assigned
    /// `service_<id>` name.
    pub fn export(&mut self, spec: &str, component_name: &str) -> String {
        self.dispatcher.export(spec, component_name)
    }

    fn send_message(&mut self, mut message: Message) {
        message.stamp_outbound(self.local.uid.as_str());
        self.uart.write(&encode_message(&message));
    }

    /// One iteration of the loop: poll the UART, advance the frame/message
    /// codec, dispatch any message that fell out, then tick every active
    /// component once.
    pub fn tick(&mut self) {
        let bytes = self.uart.poll();
        if !bytes.is_empty() {
            match self.reader.feed(&bytes) {
                Ok(events) => {
                    for event in events {
                        match event {
                            WireEvent::Hello => self.uart.write(&encode_hello()),
                            WireEvent::Message(message) => self.manage_message(message),
                        }
                    }
                }
                Err(e) => log::debug!("micronode: malformed frame, resynchronizing: {e}"),
            }
        }
        self.container.run_tick();
    }

    /// Subject dispatch mirroring the source's `manage_message` if/elif
    /// chain. Messages this peer originated (a loopback off a group
    /// broadcast) are ignored.
    fn manage_message(&mut self, message: Message) {
        if message.header(headers::ORIGINAL_SENDER) == Some(self.local.uid.as_str()) {
            return;
        }
        match message.subject.as_str() {
            directory::SUBJECT_STEP1 => {
                let reply = directory::build_step2(&self.local, &message);
                self.send_message(reply);
            }
            directory::SUBJECT_STEP3 => {
                // Handshake complete; advertise whatever this peer
                // currently exports to the peer that just registered us.
                let endpoints = self.dispatcher.local_endpoints(self.local.uid.as_str(), &self.container);
                let contact = directory::build_endpoint_message(directory::SUBJECT_RPC_DISCOVERY_CONTACT, &endpoints);
                self.send_message(contact);
            }
            SUBJECT_XMLRPC => {
                let reply = self.dispatcher.handle_request(&mut self.container, &message);
                self.send_message(reply);
            }
            SUBJECT_ROUTING_HELLO => {
                let reply = Message::new(SUBJECT_ROUTING_REPLY_N, Content::Raw("micronode".to_string()))
                    .with_header(headers::REPLIES_TO, message.uid.as_str().to_string());
                self.send_message(reply);
            }
            directory::SUBJECT_RPC_DISCOVERY_CONTACT => {
                let sender = message.sender_uid().unwrap_or("unknown-peer").to_string();
                self.register_remote_endpoints(&message, &sender);
                let endpoints = self.dispatcher.local_endpoints(self.local.uid.as_str(), &self.container);
                let add = directory::build_endpoint_message(directory::SUBJECT_RPC_DISCOVERY_ADD, &endpoints);
                self.send_message(add);
            }
            directory::SUBJECT_RPC_DISCOVERY_ADD | directory::SUBJECT_RPC_DISCOVERY_UPDATE => {
                let sender = message.sender_uid().unwrap_or("unknown-peer").to_string();
                self.register_remote_endpoints(&message, &sender);
            }
            directory::SUBJECT_RPC_DISCOVERY_REMOVE => {
                let sender = message.sender_uid().unwrap_or("unknown-peer").to_string();
                for endpoint in directory::decode_endpoints(&message) {
                    if let Some(spec) = endpoint.spec() {
                        self.container.remove_service(spec, &sender);
                    }
                }
            }
            other => {
                log::debug!("micronode: unmatched subject {other}");
            }
        }
    }

    fn register_remote_endpoints(&mut self, message: &Message, sender: &str) {
        for endpoint in directory::decode_endpoints(message) {
            if let Some(spec) = endpoint.spec() {
                self.container.add_service(spec, sender, &endpoint.name);
            }
        }
    }

    /// Fires a request at `(peer_uid, service_name)` and pumps the UART,
    /// dispatching any non-matching message normally, until the matching
    /// reply arrives or `max_ticks` iterations pass with nothing new. This
    /// is the micronode's `RemoteObject.__getattr__`/`wait_for_message`
    /// equivalent: there is no other execution context to block in, so
    /// the caller must keep feeding bytes in for the call to resolve.
    pub fn call_remote(
        &mut self,
        peer_uid: &str,
        service_name: &str,
        member: &str,
        args: Vec<Value>,
        max_ticks: usize,
        tick_interval: Duration,
    ) -> Result<Vec<Value>, HeraldError> {
        let call = MethodCall {
            method_name: format!("{service_name}.{member}"),
            params: args,
        };
        let mut request = Message::new(SUBJECT_XMLRPC, Content::Raw(call.encode()));
        request = request.with_header(headers::TARGET_PEER, peer_uid.to_string());
        let request_uid = request.uid.as_str().to_string();
        self.send_message(request);

        for _ in 0..max_ticks {
            let bytes = self.uart.poll();
            if bytes.is_empty() {
                continue;
            }
            let events = self.reader.feed(&bytes)?;
            for event in events {
                match event {
                    WireEvent::Hello => self.uart.write(&encode_hello()),
                    WireEvent::Message(message) => {
                        if message.subject == SUBJECT_XMLRPC_REPLY && message.replies_to() == Some(request_uid.as_str()) {
                            let response = MethodResponse::decode(&message.content.as_raw())?;
                            return Ok(response.params);
                        }
                        self.manage_message(message);
                    }
                }
            }
        }
        Err(HeraldError::Timeout(tick_interval * max_ticks as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MicroComponent;
    use crate::uart::BufferUart;
    use herald_common::types::Uid;

    struct Led {
        on: bool,
    }
    impl MicroComponent for Led {
        fn name(&self) -> &str {
            "led"
        }
        fn provides(&self) -> &[&str] {
            &["pyboard.led.ledService"]
        }
        fn call(&mut self, member: &str, _args: &[Value]) -> Result<Vec<Value>, HeraldError> {
            match member {
                "on" => {
                    self.on = true;
                    Ok(vec![])
                }
                "off" => {
                    self.on = false;
                    Ok(vec![])
                }
                "get_state" => Ok(vec![Value::Int(self.on as i64)]),
                _ => Err(HeraldError::NoProvider(member.to_string())),
            }
        }
    }

    fn new_node() -> MicroNode<BufferUart> {
        let local = directory::local_peer(Uid::from_raw("micro-1"), "20:14:03:19:88:23", "<herald-legacy>");
        MicroNode::new(local, BufferUart::new())
    }

    #[test]
    fn step1_triggers_step2_reply_with_own_dump() {
        let mut node = new_node();
        let step1 = Message::new(directory::SUBJECT_STEP1, Content::Empty);
        node.uart.push_inbound(&encode_message(&step1));
        node.tick();

        let written = node.uart.take_outbound();
        let mut reader = MessageReader::new();
        let events = reader.feed(&written).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WireEvent::Message(m) => assert_eq!(m.subject, directory::SUBJECT_STEP2),
            WireEvent::Hello => panic!("expected step2"),
        }
    }

    #[test]
    fn hello_is_answered_in_place_without_touching_the_reader_buffer() {
        let mut node = new_node();
        node.uart.push_inbound(&encode_hello());
        node.tick();
        assert_eq!(node.uart.take_outbound(), encode_hello());
    }

    #[test]
    fn rpc_call_reaches_exported_component_and_replies() {
        let mut node = new_node();
        node.container.register(Box::new(Led { on: false }));
        node.container.start_component("led");
        let service_name = node.export("pyboard.led.ledService", "led");

        let call = MethodCall {
            method_name: format!("{service_name}.on"),
            params: vec![],
        };
        let request = Message::new(SUBJECT_XMLRPC, Content::Raw(call.encode()));
        node.uart.push_inbound(&encode_message(&request));
        node.tick();

        assert!(node.container.dispatch_call("led", "get_state", &[]).unwrap() == vec![Value::Int(1)]);

        let written = node.uart.take_outbound();
        let mut reader = MessageReader::new();
        let events = reader.feed(&written).unwrap();
        match &events[0] {
            WireEvent::Message(m) => {
                assert_eq!(m.subject, SUBJECT_XMLRPC_REPLY);
                assert_eq!(m.replies_to(), Some(request.uid.as_str()));
            }
            WireEvent::Hello => panic!("expected an xmlrpc reply"),
        }
    }

    /// A `Uart` that answers any xmlrpc request written to it in place,
    /// standing in for the remote peer so `call_remote`'s pump loop has
    /// something to correlate against.
    struct LoopbackUart {
        reader: MessageReader,
        inbound: std::collections::VecDeque<u8>,
    }

    impl Uart for LoopbackUart {
        fn poll(&mut self) -> Vec<u8> {
            self.inbound.drain(..).collect()
        }

        fn write(&mut self, bytes: &[u8]) {
            let Ok(events) = self.reader.feed(bytes) else {
                return;
            };
            for event in events {
                if let WireEvent::Message(m) = event {
                    if m.subject == SUBJECT_XMLRPC {
                        let reply = Message::new(
                            SUBJECT_XMLRPC_REPLY,
                            Content::Raw(MethodResponse { params: vec![Value::Int(99)] }.encode()),
                        )
                        .with_header(headers::REPLIES_TO, m.uid.as_str().to_string());
                        self.inbound.extend(encode_message(&reply));
                    }
                }
            }
        }
    }

    #[test]
    fn call_remote_pumps_until_matching_reply_arrives() {
        let local = directory::local_peer(Uid::from_raw("micro-1"), "20:14:03:19:88:23", "<herald-legacy>");
        let mut node = MicroNode::new(
            local,
            LoopbackUart {
                reader: MessageReader::new(),
                inbound: std::collections::VecDeque::new(),
            },
        );

        let result = node
            .call_remote("host-peer", "service_1", "ping", vec![Value::Str("hi".to_string())], 10, Duration::from_millis(10))
            .unwrap();
        assert_eq!(result, vec![Value::Int(99)]);
    }

    #[test]
    fn call_remote_times_out_when_no_reply_arrives() {
        let mut node = new_node();
        let err = node
            .call_remote("host-peer", "service_1", "ping", vec![], 3, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, HeraldError::Timeout(_)));
    }

    #[test]
    fn step3_triggers_self_initiated_contact_with_local_endpoints() {
        let mut node = new_node();
        node.container.register(Box::new(Led { on: false }));
        node.container.start_component("led");
        node.export("pyboard.led.ledService", "led");

        let step3 = Message::new(directory::SUBJECT_STEP3, Content::Empty);
        node.uart.push_inbound(&encode_message(&step3));
        node.tick();

        let written = node.uart.take_outbound();
        let mut reader = MessageReader::new();
        let events = reader.feed(&written).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WireEvent::Message(m) => {
                assert_eq!(m.subject, directory::SUBJECT_RPC_DISCOVERY_CONTACT);
                let endpoints = directory::decode_endpoints(m);
                assert_eq!(endpoints.len(), 1);
                assert_eq!(endpoints[0].spec(), Some("pyboard.led.ledService"));
            }
            WireEvent::Hello => panic!("expected a contact message"),
        }
    }

    #[test]
    fn contact_registers_sender_endpoints_and_replies_with_add() {
        let mut node = new_node();
        let remote_endpoint = herald_common::types::Endpoint::new("host/service_9", "host-peer", "service_9", "host.console");
        let contact = directory::build_endpoint_message(directory::SUBJECT_RPC_DISCOVERY_CONTACT, &[remote_endpoint]);
        let mut contact = contact;
        contact.stamp_outbound("host-peer");
        node.uart.push_inbound(&encode_message(&contact));
        node.tick();

        assert!(node.container.has_provider("host.console", "host-peer"));

        let written = node.uart.take_outbound();
        let mut reader = MessageReader::new();
        let events = reader.feed(&written).unwrap();
        match &events[0] {
            WireEvent::Message(m) => assert_eq!(m.subject, directory::SUBJECT_RPC_DISCOVERY_ADD),
            WireEvent::Hello => panic!("expected an add reply"),
        }
    }

    #[test]
    fn remove_drops_previously_registered_external_endpoint() {
        let mut node = new_node();
        let remote_endpoint = herald_common::types::Endpoint::new("host/service_9", "host-peer", "service_9", "host.console");
        let add = directory::build_endpoint_message(directory::SUBJECT_RPC_DISCOVERY_ADD, &[remote_endpoint.clone()]);
        let mut add = add;
        add.stamp_outbound("host-peer");
        node.uart.push_inbound(&encode_message(&add));
        node.tick();
        assert!(node.container.has_provider("host.console", "host-peer"));
        node.uart.take_outbound();

        let remove = directory::build_endpoint_message(directory::SUBJECT_RPC_DISCOVERY_REMOVE, &[remote_endpoint]);
        let mut remove = remove;
        remove.stamp_outbound("host-peer");
        node.uart.push_inbound(&encode_message(&remove));
        node.tick();

        assert!(!node.container.has_provider("host.console", "host-peer"));
    }
}
