// Herald message wire format: a Herald message on the wire is
// exactly seven concatenated frames, in order: `subject`, `sender_uid`,
// `original_sender`, `final_destination`, `content`, `reply_to`,
// `message_uid`. Empty fields are zero-length frames. A hello sentinel
// frame received mid-sequence does not advance the sequence position.

use super::frame::{encode_frame, FrameDecoder};
use crate::errors::HeraldError;
use crate::types::message::headers;
use crate::types::{Content, Message, Uid};

/// The single sentinel frame reserved as a link-liveness heartbeat. Never
/// delivered to higher layers.
pub const HELLO_SENTINEL: &str = "[[[HELLO]]]";

const FIELD_COUNT: usize = 7;

/// Serialize a message as the seven-frame wire form described above.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let fields: [&str; FIELD_COUNT] = [
        &msg.subject,
        msg.header(headers::SENDER_UID).unwrap_or(""),
        msg.header(headers::ORIGINAL_SENDER).unwrap_or(""),
        msg.header(headers::FINAL_DESTINATION).unwrap_or(""),
        &msg.content.as_raw(),
        msg.header(headers::REPLIES_TO).unwrap_or(""),
        msg.uid.as_str(),
    ];
    let mut out = Vec::new();
    for field in fields {
        out.extend(encode_frame(field.as_bytes()));
    }
    out
}

/// Serialize the hello heartbeat frame.
pub fn encode_hello() -> Vec<u8> {
    encode_frame(HELLO_SENTINEL.as_bytes())
}

fn decode_fields(fields: Vec<Vec<u8>>) -> Message {
    debug_assert_eq!(fields.len(), FIELD_COUNT);
    let mut fields = fields.into_iter().map(|f| String::from_utf8_lossy(&f).into_owned());
    let subject = fields.next().unwrap_or_default();
    let sender_uid = fields.next().unwrap_or_default();
    let original_sender = fields.next().unwrap_or_default();
    let final_destination = fields.next().unwrap_or_default();
    let content = fields.next().unwrap_or_default();
    let reply_to = fields.next().unwrap_or_default();
    let message_uid = fields.next().unwrap_or_default();

    let mut msg = Message::new(subject, Content::from_raw(content));
    msg.uid = Uid::from_raw(message_uid);
    if !sender_uid.is_empty() {
        msg.headers.insert(headers::SENDER_UID.to_string(), sender_uid);
    }
    if !original_sender.is_empty() {
        msg.headers
            .insert(headers::ORIGINAL_SENDER.to_string(), original_sender);
    }
    if !final_destination.is_empty() {
        msg.headers
            .insert(headers::FINAL_DESTINATION.to_string(), final_destination);
    }
    if !reply_to.is_empty() {
        msg.headers.insert(headers::REPLIES_TO.to_string(), reply_to);
    }
    msg
}

/// Something a `MessageReader` can hand back to its caller per decoded
/// frame: either a complete Herald message, or a hello heartbeat.
#[derive(Debug)]
pub enum WireEvent {
    Message(Message),
    Hello,
}

/// Stateful reader that accumulates frames into complete Herald messages.
/// Holds a buffer of completed frames; when the buffer contains seven it
/// emits one message and clears.
#[derive(Debug, Default)]
pub struct MessageReader {
    decoder: FrameDecoder,
    pending: Vec<Vec<u8>>,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes off the wire, returning every event (message or
    /// hello) completed by this chunk, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<WireEvent>, HeraldError> {
        let frames = self.decoder.feed(bytes)?;
        let mut events = Vec::new();
        for frame in frames {
            if frame == HELLO_SENTINEL.as_bytes() {
                events.push(WireEvent::Hello);
                continue;
            }
            self.pending.push(frame);
            if self.pending.len() == FIELD_COUNT {
                let fields = std::mem::take(&mut self.pending);
                events.push(WireEvent::Message(decode_fields(fields)));
            }
        }
        Ok(events)
    }
}
