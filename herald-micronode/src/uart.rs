// The one byte stream a microcontroller-class peer owns.
//
// Grounded on `pyboard/herald.py`'s `get_message_uart`/`put_message`: a
// non-blocking read that drains whatever is currently buffered, and a
// write that goes straight to the wire. No buffering beyond what the
// frame codec already does.

/// A byte stream with non-blocking reads. Implemented by the board's UART
/// driver in a real build; `BufferUart` below stands in for it in tests.
pub trait Uart {
    /// Returns whatever bytes are currently available, or an empty vec if
    /// none. Must not block.
    fn poll(&mut self) -> Vec<u8>;

    /// Writes bytes to the wire.
    fn write(&mut self, bytes: &[u8]);
}

/// An in-memory `Uart` for tests and the demo binary: reads drain a
/// preloaded inbound queue, writes append to an outbound queue the test
/// can inspect.
#[derive(Debug, Default)]
pub struct BufferUart {
    inbound: std::collections::VecDeque<u8>,
    pub outbound: Vec<u8>,
}

impl BufferUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes as if they had just arrived on the wire.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Drains and returns everything written so far.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

impl Uart for BufferUart {
    fn poll(&mut self) -> Vec<u8> {
        self.inbound.drain(..).collect()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.outbound.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_uart_roundtrips_bytes() {
        let mut uart = BufferUart::new();
        uart.push_inbound(b"abc");
        assert_eq!(uart.poll(), b"abc".to_vec());
        assert!(uart.poll().is_empty());

        uart.write(b"reply");
        assert_eq!(uart.take_outbound(), b"reply".to_vec());
        assert!(uart.take_outbound().is_empty());
    }
}
