pub mod frame;
pub mod message_codec;

pub use frame::{encode_frame, FrameDecoder};
pub use message_codec::{encode_hello, encode_message, MessageReader, WireEvent, HELLO_SENTINEL};
