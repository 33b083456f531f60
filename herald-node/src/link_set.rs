// Process-wide table of live links, keyed by remote address.
//
// Grounded on `herald/transports/connections.py`'s `ConnectionSet`: a single
// map from address to connection plus listener callbacks for new/closed
// links and inbound messages, so the transport and directory layers don't
// each have to track link lifetime themselves.

use crate::link::{Connector, Link, LinkConfig, LinkState};
use dashmap::DashMap;
use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::types::Message;
use std::sync::Arc;

pub type NewLinkCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type LeftLinkCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type InboundCallback = Arc<dyn Fn(Message, String) + Send + Sync>;

/// Owns every link opened by this node, opening new ones on demand and
/// reaping them once they close.
pub struct LinkSet {
    links: DashMap<String, Arc<Link>>,
    connector: Arc<dyn Connector>,
    config: LinkConfig,
    logger: Logger,
    on_new: NewLinkCallback,
    on_left: LeftLinkCallback,
    on_message: InboundCallback,
}

impl LinkSet {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: LinkConfig,
        on_new: NewLinkCallback,
        on_left: LeftLinkCallback,
        on_message: InboundCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            links: DashMap::new(),
            connector,
            config,
            logger: Logger::new_root(Component::Link, "link-set".to_string()),
            on_new,
            on_left,
            on_message,
        })
    }

    /// Returns the link for `address`, opening one if none exists yet.
    pub fn update(self: &Arc<Self>, address: &str) -> Arc<Link> {
        if let Some(existing) = self.links.get(address) {
            return existing.clone();
        }
        let address = address.to_string();
        let on_message = self.on_message.clone();
        let on_message_cb: crate::link::MessageCallback =
            Arc::new(move |msg, addr| on_message(msg, addr));

        let set = self.clone();
        let addr_for_error = address.clone();
        let on_error: crate::link::ErrorCallback = Arc::new(move |addr| {
            set.logger.debug(format!("link to {addr} failed"));
            set.reap(&addr);
        });

        let set2 = self.clone();
        let on_start: crate::link::StartCallback = Arc::new(move |addr| {
            (set2.on_new)(addr);
        });

        let link = Arc::new(Link::spawn(
            address.clone(),
            self.connector.clone(),
            self.config.clone(),
            on_message_cb,
            on_error,
            on_start,
        ));
        self.links.insert(address.clone(), link.clone());
        self.logger.debug(format!("opened link to {addr_for_error}"));
        link
    }

    /// Sends `message` over the link to `address`. Fails with `NoLink` if
    /// no link has been brought up for this address yet — bringing one up
    /// is `update`'s job, not `send_to`'s.
    pub async fn send_to(&self, address: &str, message: &Message) -> Result<(), HeraldError> {
        let link = self
            .links
            .get(address)
            .map(|l| l.clone())
            .ok_or_else(|| HeraldError::NoLink(address.to_string()))?;
        link.send(message).await
    }

    pub fn state_of(&self, address: &str) -> Option<LinkState> {
        self.links.get(address).map(|l| l.state())
    }

    fn reap(self: &Arc<Self>, address: &str) {
        if self.links.remove(address).is_some() {
            (self.on_left)(address.to_string());
        }
    }

    /// Closes every link, used on node shutdown.
    pub async fn close_all(&self) {
        let addresses: Vec<String> = self.links.iter().map(|e| e.key().clone()).collect();
        for addr in addresses {
            if let Some((_, link)) = self.links.remove(&addr) {
                link.close();
            }
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        self.links.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_common::types::Content;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Mutex as AsyncMutex;

    struct DuplexConnector {
        peer: AsyncMutex<Option<tokio::io::DuplexStream>>,
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        async fn connect(&self, _address: &str) -> Result<Box<dyn crate::link::ByteStream>, HeraldError> {
            let stream = self.peer.lock().await.take().expect("duplex half already taken");
            Ok(Box::new(stream))
        }
    }

    fn noop_link_set(connector: Arc<dyn Connector>) -> Arc<LinkSet> {
        LinkSet::new(
            connector,
            LinkConfig {
                ping_period: std::time::Duration::from_millis(50),
                link_timeout: std::time::Duration::from_millis(500),
                coalesce_period: std::time::Duration::from_millis(10),
                handshake_timeout: std::time::Duration::from_secs(2),
            },
            Arc::new(|_| {}),
            Arc::new(|_| {}),
            Arc::new(|_, _| {}),
        )
    }

    #[tokio::test]
    async fn send_to_unknown_address_fails_with_no_link() {
        let connector = Arc::new(DuplexConnector { peer: AsyncMutex::new(None) });
        let link_set = noop_link_set(connector);
        let msg = Message::new("t/s", Content::from_raw("hi"));
        let err = link_set.send_to("nowhere", &msg).await.unwrap_err();
        assert_eq!(err, HeraldError::NoLink("nowhere".to_string()));
    }

    #[tokio::test]
    async fn update_then_send_to_delivers_once_valid() {
        let (a, b) = duplex(4096);
        let connector = Arc::new(DuplexConnector { peer: AsyncMutex::new(Some(a)) });
        let link_set = noop_link_set(connector);

        link_set.update("peer-b");
        assert_eq!(link_set.addresses(), vec!["peer-b".to_string()]);

        let (mut br, mut bw) = tokio::io::split(b);
        let mut buf = [0u8; 64];
        let n = br.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], herald_common::wire::encode_hello().as_slice());
        bw.write_all(&herald_common::wire::encode_hello()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let msg = Message::new("t/s", Content::from_raw("hi"));
        link_set.send_to("peer-b", &msg).await.unwrap();
    }

    #[tokio::test]
    async fn close_all_removes_every_tracked_address() {
        let (a, _b) = duplex(4096);
        let connector = Arc::new(DuplexConnector { peer: AsyncMutex::new(Some(a)) });
        let link_set = noop_link_set(connector);
        link_set.update("peer-b");
        assert_eq!(link_set.addresses().len(), 1);

        link_set.close_all().await;
        assert!(link_set.addresses().is_empty());
    }
}

