// Length-delimited byte framing: each frame is
// `<ASCII-decimal-length>:<bytes-of-that-length>`, concatenated without a
// separator between frames.

use crate::errors::HeraldError;

/// Encode `payload` as a single frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 12);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out
}

#[derive(Debug)]
enum State {
    ReadingLength { digits: Vec<u8> },
    ReadingBody { len: usize, buf: Vec<u8> },
}

/// Stateful decoder that turns a raw inbound byte stream into complete
/// frame payloads. Fed incrementally (one or more bytes at a time) as
/// bytes arrive off the wire.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::ReadingLength { digits: Vec::new() },
        }
    }

    /// Feed a chunk of bytes, returning every frame payload completed by
    /// this chunk, in order. On `MalformedFrame`, the decoder resets to a
    /// clean state so the caller can keep feeding subsequent bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, HeraldError> {
        let mut completed = Vec::new();
        for &byte in bytes {
            if let Err(e) = self.feed_byte(byte, &mut completed) {
                self.state = State::ReadingLength { digits: Vec::new() };
                return Err(e);
            }
        }
        Ok(completed)
    }

    fn feed_byte(&mut self, byte: u8, completed: &mut Vec<Vec<u8>>) -> Result<(), HeraldError> {
        match &mut self.state {
            State::ReadingLength { digits } => {
                if byte == b':' {
                    let digit_str = std::str::from_utf8(digits).map_err(|_| {
                        HeraldError::MalformedFrame(
                            "length prefix is not valid UTF-8".to_string(),
                        )
                    })?;
                    if digit_str.is_empty() {
                        return Err(HeraldError::MalformedFrame(
                            "empty length prefix".to_string(),
                        ));
                    }
                    let len: usize = digit_str.parse().map_err(|_| {
                        HeraldError::MalformedFrame(format!(
                            "length prefix is not a valid decimal number: {digit_str:?}"
                        ))
                    })?;
                    self.state = State::ReadingBody {
                        len,
                        buf: Vec::with_capacity(len),
                    };
                } else if byte.is_ascii_digit() {
                    digits.push(byte);
                } else {
                    return Err(HeraldError::MalformedFrame(format!(
                        "non-digit byte {byte:#x} before ':'"
                    )));
                }
            }
            State::ReadingBody { len, buf } => {
                buf.push(byte);
                if buf.len() == *len {
                    let State::ReadingBody { buf, .. } = std::mem::replace(
                        &mut self.state,
                        State::ReadingLength { digits: Vec::new() },
                    ) else {
                        unreachable!()
                    };
                    completed.push(buf);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_two_frames() {
        let mut d = FrameDecoder::new();
        let frames = d.feed(b"3:abc5:hello").unwrap();
        assert_eq!(frames, vec![b"abc".to_vec(), b"hello".to_vec()]);
    }

    #[test]
    fn decode_incrementally() {
        let mut d = FrameDecoder::new();
        assert!(d.feed(b"3:a").unwrap().is_empty());
        assert!(d.feed(b"b").unwrap().is_empty());
        let frames = d.feed(b"c").unwrap();
        assert_eq!(frames, vec![b"abc".to_vec()]);
    }

    #[test]
    fn roundtrip_arbitrary_bytes() {
        let payload: Vec<u8> = (0u32..=1000).map(|i| (i % 256) as u8).collect();
        let encoded = encode_frame(&payload);
        let mut d = FrameDecoder::new();
        let frames = d.feed(&encoded).unwrap();
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let encoded = encode_frame(b"");
        assert_eq!(encoded, b"0:");
        let mut d = FrameDecoder::new();
        assert_eq!(d.feed(&encoded).unwrap(), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn non_digit_before_colon_is_malformed() {
        let mut d = FrameDecoder::new();
        assert!(d.feed(b"3x:abc").is_err());
    }

    #[test]
    fn decoder_resets_after_malformed_frame_and_continues() {
        let mut d = FrameDecoder::new();
        assert!(d.feed(b"3x").is_err());
        // The decoder is clean again; a fresh well-formed frame still decodes.
        let frames = d.feed(b"3:abc").unwrap();
        assert_eq!(frames, vec![b"abc".to_vec()]);
    }
}
