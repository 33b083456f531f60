// Neighbour liveness probing.
//
// Grounded on `herald/routing/hellos.py`'s `Hellos` class: a per-neighbour
// `{metric, last_ask, router}` table updated on reply, with a granularity
// filter damping small metric changes and a hard timeout that evicts a
// neighbour from the table entirely.

use herald_common::logging::{Component, Logger};
use herald_common::types::{Content, Message};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const SUBJECT_HELLO: &str = "herald/routing/hello/";
pub const SUBJECT_REPLY_PREFIX: &str = "herald/routing/reply/";

/// Whether a neighbour participates in roads advertisements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterTag {
    Router,
    Node,
}

impl RouterTag {
    pub fn as_letter(self) -> &'static str {
        match self {
            RouterTag::Router => "R",
            RouterTag::Node => "N",
        }
    }

    pub fn parse(letter: &str) -> Option<Self> {
        match letter {
            "R" => Some(RouterTag::Router),
            "N" => Some(RouterTag::Node),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NeighbourInfo {
    pub metric: f64,
    pub router: RouterTag,
    last_ask: Option<Instant>,
}

struct Table {
    neighbours: HashMap<String, NeighbourInfo>,
}

/// Periodically pings every directory peer not currently awaiting a reply
/// and tracks per-neighbour `{metric, last_ask, router}` state.
pub struct HelloRouter {
    local_router: RouterTag,
    hello_delay: Duration,
    hello_timeout: Duration,
    granularity: f64,
    table: Mutex<Table>,
    logger: Logger,
}

impl HelloRouter {
    pub fn new(local_router: RouterTag, hello_delay: Duration, hello_timeout: Duration, granularity: f64) -> Self {
        Self {
            local_router,
            hello_delay,
            hello_timeout,
            granularity,
            table: Mutex::new(Table {
                neighbours: HashMap::new(),
            }),
            logger: Logger::new_root(Component::Routing, "hellos".to_string()),
        }
    }

    pub fn hello_delay(&self) -> Duration {
        self.hello_delay
    }

    /// Builds the one-frame hello to send to `neighbour`, marking it as
    /// awaiting a reply.
    pub fn send_hello(&self, neighbour: &str) -> Message {
        let mut table = self.table.lock().unwrap();
        let entry = table.neighbours.entry(neighbour.to_string()).or_insert_with(|| NeighbourInfo {
            metric: f64::INFINITY,
            router: RouterTag::Node,
            last_ask: None,
        });
        entry.last_ask = Some(Instant::now());
        Message::new(SUBJECT_HELLO, Content::Empty)
    }

    /// True if `neighbour` has no hello outstanding.
    pub fn is_awaiting_reply(&self, neighbour: &str) -> bool {
        self.table
            .lock()
            .unwrap()
            .neighbours
            .get(neighbour)
            .and_then(|n| n.last_ask)
            .is_some()
    }

    /// Builds the reply to a received hello, tagging this node's own
    /// router status.
    pub fn build_reply(&self) -> Message {
        let subject = format!("{SUBJECT_REPLY_PREFIX}{}/", self.local_router.as_letter());
        Message::new(subject, Content::Empty)
    }

    /// Handles a reply from `neighbour` whose subject carries the
    /// responder's router tag. Applies the granularity-damped metric
    /// update rule.
    pub fn handle_reply(&self, neighbour: &str, reply_subject: &str) {
        let tag = reply_subject
            .strip_prefix(SUBJECT_REPLY_PREFIX)
            .and_then(|rest| rest.split('/').next())
            .and_then(RouterTag::parse)
            .unwrap_or(RouterTag::Node);

        let mut table = self.table.lock().unwrap();
        let Some(entry) = table.neighbours.get_mut(neighbour) else {
            return;
        };
        let Some(last_ask) = entry.last_ask.take() else {
            return;
        };
        let new_metric = last_ask.elapsed().as_secs_f64();
        if (new_metric - entry.metric).abs() >= self.granularity || entry.metric.is_infinite() {
            entry.metric = new_metric;
        }
        entry.router = tag;
    }

    /// Evicts any neighbour whose hello has been outstanding longer than
    /// `hello_timeout`.
    pub fn expire_stale(&self) -> Vec<String> {
        let mut table = self.table.lock().unwrap();
        let timeout = self.hello_timeout;
        let stale: Vec<String> = table
            .neighbours
            .iter()
            .filter(|(_, info)| info.last_ask.is_some_and(|t| t.elapsed() > timeout))
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in &stale {
            table.neighbours.remove(uid);
            self.logger.info(format!("neighbour {uid} unreachable"));
        }
        stale
    }

    pub fn neighbours(&self) -> Vec<String> {
        self.table.lock().unwrap().neighbours.keys().cloned().collect()
    }

    pub fn neighbour_metric(&self, uid: &str) -> Option<f64> {
        self.table.lock().unwrap().neighbours.get(uid).map(|n| n.metric)
    }

    pub fn is_reachable(&self, uid: &str) -> bool {
        self.table.lock().unwrap().neighbours.contains_key(uid)
    }

    pub fn router_neighbours(&self) -> Vec<String> {
        self.table
            .lock()
            .unwrap()
            .neighbours
            .iter()
            .filter(|(_, info)| info.router == RouterTag::Router)
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    pub fn set_not_reachable(&self, uid: &str) {
        self.table.lock().unwrap().neighbours.remove(uid);
    }

    pub fn change_metric(&self, uid: &str, value: f64) {
        if let Some(entry) = self.table.lock().unwrap().neighbours.get_mut(uid) {
            entry.metric = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_computes_elapsed_metric() {
        let router = HelloRouter::new(RouterTag::Node, Duration::from_secs(1), Duration::from_secs(3), 0.0);
        router.send_hello("peer-b");
        assert!(router.is_awaiting_reply("peer-b"));
        std::thread::sleep(Duration::from_millis(10));
        router.handle_reply("peer-b", "herald/routing/reply/R/");
        let metric = router.neighbour_metric("peer-b").unwrap();
        assert!(metric >= 0.005 && metric < 0.5, "metric was {metric}");
        assert!(router.router_neighbours().contains(&"peer-b".to_string()));
    }

    #[test]
    fn stale_hello_evicts_neighbour() {
        let router = HelloRouter::new(RouterTag::Node, Duration::from_millis(1), Duration::from_millis(5), 0.0);
        router.send_hello("peer-c");
        std::thread::sleep(Duration::from_millis(10));
        let stale = router.expire_stale();
        assert_eq!(stale, vec!["peer-c".to_string()]);
        assert!(!router.is_reachable("peer-c"));
    }
}
