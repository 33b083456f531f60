// One peer-to-peer byte stream with connect, heartbeat, read loop, outbound
// coalescing.
//
// Grounded on `herald/transports/bluetooth/connection.py`'s `Connection`:
// an init step that exchanges a hello before the link is usable, a read
// loop that feeds the frame codec, a keepalive loop that pings and fails
// the link on timeout, and an outbound buffer drained on its own period
// because the downstream device needs writes spaced out.
//
// The four responsibilities above are modeled here as four tokio tasks
// sharing the link's state through a `watch` channel (so `send` during
// the handshake can simply await the state changing) and an outbound
// buffer behind a `tokio::sync::Mutex`.

use async_trait::async_trait;
use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::types::Message;
use herald_common::wire::{encode_hello, encode_message, MessageReader, WireEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A bidirectional byte stream to one remote address. Implemented over
/// Bluetooth RFCOMM or a serial UART in production; tests use an in-memory
/// duplex pipe (`tokio::io::duplex`).
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ByteStream for T {}

/// Opens a new byte stream to `address`. One implementation per transport
/// (Bluetooth RFCOMM connect, serial port open, ...).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<Box<dyn ByteStream>, HeraldError>;
}

/// Link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Handshaking,
    Valid,
    Closing,
    Closed,
}

/// Tunables for a link's cooperating loops.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub ping_period: Duration,
    pub link_timeout: Duration,
    pub coalesce_period: Duration,
    pub handshake_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ping_period: Duration::from_secs(5),
            link_timeout: Duration::from_secs(12),
            coalesce_period: Duration::from_millis(200),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

pub type MessageCallback = Arc<dyn Fn(Message, String) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type StartCallback = Arc<dyn Fn(String) + Send + Sync>;

struct Shared {
    address: String,
    outbound: Mutex<Vec<u8>>,
    last_hello_received: Mutex<std::time::Instant>,
    error_fired: AtomicBool,
    start_fired: AtomicBool,
    logger: Logger,
}

/// A link to one remote address, spawned per remote address by a
/// [`crate::link_set::LinkSet`].
pub struct Link {
    shared: Arc<Shared>,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Spawn a link to `address`. Runs the init/read/keepalive/outbound
    /// loops as cooperating tasks; returns immediately (does not wait for
    /// the handshake to complete).
    pub fn spawn(
        address: String,
        connector: Arc<dyn Connector>,
        config: LinkConfig,
        on_message: MessageCallback,
        on_error: ErrorCallback,
        on_start: StartCallback,
    ) -> Self {
        let logger = Logger::new_root(Component::Link, address.clone());
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let shared = Arc::new(Shared {
            address: address.clone(),
            outbound: Mutex::new(Vec::new()),
            last_hello_received: Mutex::new(std::time::Instant::now()),
            error_fired: AtomicBool::new(false),
            start_fired: AtomicBool::new(false),
            logger,
        });
        let cancel = CancellationToken::new();

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(init_loop(
            shared.clone(),
            connector,
            config.clone(),
            state_tx.clone(),
            state_rx.clone(),
            cancel.clone(),
            on_message,
            on_error.clone(),
            on_start,
        )));

        Link {
            shared,
            state_tx,
            state_rx,
            cancel,
            tasks,
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Enqueue a message for delivery. Blocks until the link reaches
    /// `Valid` if it's still handshaking; fails immediately if
    /// the link is closing/closed.
    pub async fn send(&self, message: &Message) -> Result<(), HeraldError> {
        self.wait_sendable().await?;
        let bytes = encode_message(message);
        self.shared.outbound.lock().await.extend(bytes);
        Ok(())
    }

    async fn wait_sendable(&self) -> Result<(), HeraldError> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow() {
                LinkState::Valid => return Ok(()),
                LinkState::Closing | LinkState::Closed => {
                    return Err(HeraldError::LinkClosed)
                }
                LinkState::Connecting | LinkState::Handshaking => {}
            }
            if rx.changed().await.is_err() {
                return Err(HeraldError::LinkClosed);
            }
        }
    }

    /// Transition to `Closing`; the init/read/keepalive/outbound loops
    /// observe the cancellation token and wind down.
    pub fn close(&self) {
        let _ = self.state_tx.send(LinkState::Closing);
        self.cancel.cancel();
    }

    /// True once every loop has finished and the link reached `Closed`.
    pub fn is_closed(&self) -> bool {
        matches!(self.state(), LinkState::Closed)
    }

    pub async fn join(mut self) {
        for t in self.tasks.drain(..) {
            let _ = t.await;
        }
    }
}

fn fire_error_once(shared: &Shared, on_error: &ErrorCallback) {
    if shared
        .error_fired
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        on_error(shared.address.clone());
    }
}

#[allow(clippy::too_many_arguments)]
async fn init_loop(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: LinkConfig,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    cancel: CancellationToken,
    on_message: MessageCallback,
    on_error: ErrorCallback,
    on_start: StartCallback,
) {
    let stream = match connector.connect(&shared.address).await {
        Ok(stream) => stream,
        Err(e) => {
            shared.logger.warn(format!("connect failed: {e}"));
            let _ = state_tx.send(LinkState::Closing);
            fire_error_once(&shared, &on_error);
            let _ = state_tx.send(LinkState::Closed);
            return;
        }
    };
    let _ = state_tx.send(LinkState::Handshaking);

    let (read_half, write_half) = tokio::io::split(stream);
    let write_half = Arc::new(Mutex::new(write_half));

    // Step 1: send our hello immediately (bypassing the coalescing buffer
    // so the handshake isn't held up by the outbound loop's period).
    {
        let mut w = write_half.lock().await;
        if let Err(e) = w.write_all(&encode_hello()).await {
            shared.logger.warn(format!("hello send failed: {e}"));
            let _ = state_tx.send(LinkState::Closing);
            fire_error_once(&shared, &on_error);
            let _ = state_tx.send(LinkState::Closed);
            return;
        }
    }

    // Step 2: wait for a reciprocal hello, with a timeout. The read loop is
    // spawned now so it can observe it; `hello_rx` is signalled once.
    let (hello_tx, mut hello_rx) = tokio::sync::mpsc::channel::<()>(1);
    *shared.last_hello_received.lock().await = std::time::Instant::now();

    let read_task = tokio::spawn(read_loop(
        shared.clone(),
        read_half,
        cancel.clone(),
        on_message,
        Some(hello_tx),
    ));

    let handshake = tokio::time::timeout(config.handshake_timeout, hello_rx.recv()).await;
    if !matches!(handshake, Ok(Some(()))) {
        shared.logger.info("handshake timed out".to_string());
        let _ = state_tx.send(LinkState::Closing);
        fire_error_once(&shared, &on_error);
        cancel.cancel();
        read_task.abort();
        let _ = state_tx.send(LinkState::Closed);
        return;
    }

    let _ = state_tx.send(LinkState::Valid);
    if shared
        .start_fired
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        on_start(shared.address.clone());
    }

    let keepalive_task = tokio::spawn(keepalive_loop(
        shared.clone(),
        config.clone(),
        state_tx.clone(),
        state_rx.clone(),
        cancel.clone(),
        on_error.clone(),
    ));
    let outbound_task = tokio::spawn(outbound_loop(
        shared.clone(),
        write_half,
        config,
        cancel.clone(),
        state_tx.clone(),
        on_error,
    ));

    let _ = tokio::join!(read_task, keepalive_task, outbound_task);
    let _ = state_tx.send(LinkState::Closed);
}

async fn read_loop(
    shared: Arc<Shared>,
    mut read_half: impl AsyncRead + Unpin,
    cancel: CancellationToken,
    on_message: MessageCallback,
    mut hello_tx: Option<tokio::sync::mpsc::Sender<()>>,
) {
    let mut reader = MessageReader::new();
    let mut buf = [0u8; 512];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_half.read(&mut buf) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    shared.logger.warn(format!("read error: {e}"));
                    break;
                }
            },
        };
        match reader.feed(&buf[..n]) {
            Ok(events) => {
                for event in events {
                    match event {
                        WireEvent::Hello => {
                            *shared.last_hello_received.lock().await = std::time::Instant::now();
                            if let Some(tx) = hello_tx.take() {
                                let _ = tx.send(()).await;
                            }
                        }
                        WireEvent::Message(message) => {
                            on_message(message, shared.address.clone());
                        }
                    }
                }
            }
            Err(e) => {
                shared.logger.debug(format!("dropping malformed frame: {e}"));
            }
        }
    }
}

async fn keepalive_loop(
    shared: Arc<Shared>,
    config: LinkConfig,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    cancel: CancellationToken,
    on_error: ErrorCallback,
) {
    let mut interval = tokio::time::interval(config.ping_period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if *state_rx.borrow() != LinkState::Valid {
            break;
        }
        let last = *shared.last_hello_received.lock().await;
        if last.elapsed() > config.link_timeout {
            shared.logger.info("heartbeat timeout".to_string());
            let _ = state_tx.send(LinkState::Closing);
            fire_error_once(&shared, &on_error);
            cancel.cancel();
            break;
        }
        shared.outbound.lock().await.extend(encode_hello());
    }
}

async fn outbound_loop<W: AsyncWrite + Unpin>(
    shared: Arc<Shared>,
    write_half: Arc<Mutex<W>>,
    config: LinkConfig,
    cancel: CancellationToken,
    state_tx: watch::Sender<LinkState>,
    on_error: ErrorCallback,
) {
    let mut interval = tokio::time::interval(config.coalesce_period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let pending = {
            let mut buf = shared.outbound.lock().await;
            if buf.is_empty() {
                continue;
            }
            std::mem::take(&mut *buf)
        };
        let mut w = write_half.lock().await;
        if let Err(e) = w.write_all(&pending).await {
            shared.logger.warn(format!("write error: {e}"));
            let _ = state_tx.send(LinkState::Closing);
            fire_error_once(&shared, &on_error);
            cancel.cancel();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::Content;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::duplex;

    struct DuplexConnector {
        peer: Mutex<Option<tokio::io::DuplexStream>>,
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        async fn connect(&self, _address: &str) -> Result<Box<dyn ByteStream>, HeraldError> {
            let stream = self
                .peer
                .lock()
                .await
                .take()
                .expect("duplex half already taken");
            Ok(Box::new(stream))
        }
    }

    #[tokio::test]
    async fn link_handshakes_and_delivers_a_message() {
        let (a, b) = duplex(4096);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        let on_message: MessageCallback = Arc::new(move |msg, _addr| {
            let received2 = received2.clone();
            tokio::spawn(async move {
                received2.lock().await.push(msg);
            });
        });

        let start_count = Arc::new(AtomicUsize::new(0));
        let start_count2 = start_count.clone();
        let on_start: StartCallback = Arc::new(move |_addr| {
            start_count2.fetch_add(1, Ordering::SeqCst);
        });
        let on_error: ErrorCallback = Arc::new(|_addr| {});

        let connector = Arc::new(DuplexConnector {
            peer: Mutex::new(Some(a)),
        });
        let config = LinkConfig {
            ping_period: Duration::from_millis(50),
            link_timeout: Duration::from_millis(500),
            coalesce_period: Duration::from_millis(10),
            handshake_timeout: Duration::from_secs(2),
        };
        let link = Link::spawn(
            "peer-b".to_string(),
            connector,
            config,
            on_message,
            on_error,
            on_start,
        );

        // Drive the "remote" side of the handshake by hand: read our hello,
        // send one back.
        let (mut br, mut bw) = tokio::io::split(b);
        let mut buf = [0u8; 64];
        let n = br.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], encode_hello().as_slice());
        bw.write_all(&encode_hello()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(link.state(), LinkState::Valid);
        assert_eq!(start_count.load(Ordering::SeqCst), 1);

        let msg = Message::new("t/s", Content::from_raw("hi"));
        link.send(&msg).await.unwrap();

        // Drain the outbound coalescing buffer manually.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut wire = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_millis(200), br.read(&mut wire))
            .await
            .unwrap()
            .unwrap();
        let mut reader = MessageReader::new();
        let events = reader.feed(&wire[..n]).unwrap();
        assert!(matches!(&events[0], WireEvent::Message(m) if m.subject == "t/s"));

        link.close();
    }
}
