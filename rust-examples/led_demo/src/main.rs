//! End-to-end demo exercising the RPC round-trip scenario from the
//! testable-properties list: a `Led` component hosted on a
//! micronode-style peer exposes `pyboard.led.ledService`, a host peer
//! discovers it over a direct byte-stream link and invokes `on`/
//! `get_state` on it through a `RemoteObject` proxy.
//!
//! The two sides run in one process over an in-memory duplex pipe
//! standing in for the serial/Bluetooth link; everything above the byte
//! stream (framing, discovery handshake, RPC codec) is the same code a
//! real Bluetooth transport would drive.

use async_trait::async_trait;
use herald_common::errors::HeraldError;
use herald_common::rpc::Value;
use herald_common::types::{AccessDescriptor, BluetoothAccess, Peer, Uid};
use herald_node::directory::AccessLoader;
use herald_node::node::NodeConfig;
use herald_node::rpc::RemoteObject;
use herald_node::{ByteStream, Connector, Node};
use herald_micronode::container::MicroComponent;
use herald_micronode::{directory as micro_directory, MicroNode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

const LINK_ADDRESS: &str = "micronode-mac";
const LED_SPEC: &str = "pyboard.led.ledService";

/// Hands out the single duplex half this demo keeps open, mirroring the
/// `DuplexConnector` test fixture in `herald-node`'s link/link-set tests.
struct DuplexConnector {
    half: AsyncMutex<Option<tokio::io::DuplexStream>>,
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, _address: &str) -> Result<Box<dyn ByteStream>, HeraldError> {
        let stream = self.half.lock().await.take().expect("duplex half already taken");
        Ok(Box::new(stream))
    }
}

/// Loads a peer dump's bluetooth access, falling back to the address the
/// frame actually arrived on if the dump's own data doesn't parse.
struct BluetoothLoader;

impl AccessLoader for BluetoothLoader {
    fn load(&self, access_id: &str, data: &serde_json::Value, source_address: &str) -> Option<AccessDescriptor> {
        match access_id {
            "bluetooth" => Some(AccessDescriptor::Bluetooth(
                BluetoothAccess::load(data).unwrap_or_else(|| BluetoothAccess::new(source_address, None)),
            )),
            other => AccessDescriptor::load(other, data),
        }
    }
}

/// An LED exposed over RPC. Out of scope for the library (spec §1 lists
/// LEDs as an external collaborator); this is demo glue only.
#[derive(Default)]
struct Led {
    on: bool,
}

impl MicroComponent for Led {
    fn name(&self) -> &str {
        "led"
    }
    fn provides(&self) -> &[&str] {
        &[LED_SPEC]
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
            other => Err(HeraldError::NoProvider(other.to_string())),
        }
    }
}

/// A `Uart` backed by one half of an in-memory duplex pipe, bridged to it
/// by a reader and a writer task. The micronode's cooperative loop itself
/// never touches async I/O directly — it only ever sees `poll`/`write`.
struct DuplexUart {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound_tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

impl herald_micronode::uart::Uart for DuplexUart {
    fn poll(&mut self) -> Vec<u8> {
        self.inbound.lock().unwrap().drain(..).collect()
    }

    fn write(&mut self, bytes: &[u8]) {
        let _ = self.outbound_tx.send(bytes.to_vec());
    }
}

fn spawn_duplex_uart(stream: tokio::io::DuplexStream) -> DuplexUart {
    let (mut read_half, mut write_half) = split(stream);
    let inbound = Arc::new(Mutex::new(VecDeque::new()));
    let inbound_for_reader = inbound.clone();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => inbound_for_reader.lock().unwrap().extend(&buf[..n]),
            }
        }
    });

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    DuplexUart { inbound, outbound_tx }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (host_half, micro_half) = duplex(4096);

    let host_uid = Uid::new_random();
    let host_peer = Peer::new(host_uid.clone(), "host-demo", host_uid.to_string(), "herald-led-demo");
    let connector = Arc::new(DuplexConnector {
        half: AsyncMutex::new(Some(host_half)),
    });
    let node = Node::new(
        host_peer,
        vec![("bluetooth".to_string(), connector as Arc<dyn Connector>)],
        Arc::new(BluetoothLoader),
        NodeConfig::default(),
    );

    let micro_uid = Uid::new_random();
    let micro_peer = micro_directory::local_peer(micro_uid.clone(), LINK_ADDRESS, "herald-led-demo");
    let mut micronode = MicroNode::new(micro_peer, spawn_duplex_uart(micro_half));
    micronode.container.register(Box::new(Led::default()));
    micronode.container.start_component("led");
    let service_name = micronode.export(LED_SPEC, "led");

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            tokio::task::spawn_local(async move {
                loop {
                    micronode.tick();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            });

            // Open the link and drive the three-step discovery handshake by
            // hand: the host doesn't yet know this address belongs to a
            // peer, so there's no `Peer` in the directory to route a
            // `bus.fire` through until step 2 comes back.
            let link = node.link_set.update(LINK_ADDRESS);
            let mut step1 = node.peer_contact.build_step1();
            step1.stamp_outbound(node.directory.local_peer().uid.as_str());
            link.send(&step1).await.expect("step1 send");

            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            while node.directory.get(micro_uid.as_str()).is_none() {
                if tokio::time::Instant::now() > deadline {
                    anyhow::bail!("discovery handshake did not complete");
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let led_peer = node.directory.get(micro_uid.as_str()).expect("led peer registered");
            let led = RemoteObject::new(led_peer, service_name, node.bus.clone(), node.reply_correlator.clone());

            led.call("on", vec![]).await?;
            let state = led.call("get_state", vec![]).await?;
            println!("led state after on(): {state:?}");
            assert_eq!(state, vec![Value::Int(1)]);

            node.shutdown().await;
            Ok::<(), anyhow::Error>(())
        })
        .await?;

    Ok(())
}
