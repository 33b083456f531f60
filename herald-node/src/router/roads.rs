// Distance-vector routing table.
//
// Grounded on `herald/routing/roads.py`'s `Roads` class. Adopts the
// strict split-horizon poisoning form ("drop entries whose next_hop ==
// sender"), not the looser variant also present in the source.

use super::hellos::HelloRouter;
use herald_common::logging::{Component, Logger};
use std::collections::HashMap;
use std::sync::RwLock;

pub const SUBJECT_ROADS: &str = "herald/routing/roads/";

struct Table {
    next_hop: HashMap<String, String>,
    metric: HashMap<String, f64>,
}

/// Distance-vector table: `next_hop[d]`/`metric[d]` per non-neighbor
/// destination, updated from periodic `roads` advertisements.
pub struct RoadsRouter {
    road_delay: std::time::Duration,
    table: RwLock<Table>,
    logger: Logger,
}

impl RoadsRouter {
    pub fn new(road_delay: std::time::Duration) -> Self {
        Self {
            road_delay,
            table: RwLock::new(Table {
                next_hop: HashMap::new(),
                metric: HashMap::new(),
            }),
            logger: Logger::new_root(Component::Routing, "roads".to_string()),
        }
    }

    pub fn road_delay(&self) -> std::time::Duration {
        self.road_delay
    }

    /// Builds the advertisement to send to router-neighbour `t`: every
    /// known destination's `metric[d] + hello_metric(next_hop[d])`,
    /// restricted to destinations not routed through `t` (split horizon),
    /// plus direct neighbors keyed to their own hello metric.
    pub fn build_advertisement(&self, target: &str, hellos: &HelloRouter) -> HashMap<String, f64> {
        let table = self.table.read().unwrap();
        let mut advertisement = HashMap::new();

        for (dest, next) in &table.next_hop {
            if next == target {
                continue;
            }
            let Some(&dest_metric) = table.metric.get(dest) else {
                continue;
            };
            let hop_metric = hellos.neighbour_metric(next).unwrap_or(0.0);
            advertisement.insert(dest.clone(), dest_metric + hop_metric);
        }

        for neighbour in hellos.neighbours() {
            if let Some(metric) = hellos.neighbour_metric(&neighbour) {
                advertisement.insert(neighbour, metric);
            }
        }
        advertisement
    }

    /// Applies an advertisement received from `sender`: first
    /// poisons every entry whose `next_hop == sender`, then for each
    /// advertised `(d, m)` — skipping destinations that are direct
    /// neighbours — adopts `(sender, m)` when `d` is unknown or `m`
    /// strictly improves the known metric. Replaces the table atomically.
    pub fn handle_advertisement(&self, sender: &str, advertisement: &HashMap<String, f64>, hellos: &HelloRouter) {
        let mut table = self.table.write().unwrap();

        let poisoned: Vec<String> = table
            .next_hop
            .iter()
            .filter(|(_, next)| next.as_str() == sender)
            .map(|(dest, _)| dest.clone())
            .collect();
        for dest in &poisoned {
            table.next_hop.remove(dest);
            table.metric.remove(dest);
        }

        for (dest, &metric) in advertisement {
            if hellos.is_reachable(dest) {
                continue;
            }
            let improves = match table.metric.get(dest) {
                None => true,
                Some(&existing) => metric < existing,
            };
            if improves {
                table.next_hop.insert(dest.clone(), sender.to_string());
                table.metric.insert(dest.clone(), metric);
            }
        }
    }

    /// Prunes direct-neighbour entries before returning, so a neighbour
    /// that just became reachable never appears stale.
    fn prune_direct_neighbours(&self, hellos: &HelloRouter) {
        let mut table = self.table.write().unwrap();
        let directs: Vec<String> = table.next_hop.keys().filter(|d| hellos.is_reachable(d)).cloned().collect();
        for d in directs {
            table.next_hop.remove(&d);
            table.metric.remove(&d);
        }
    }

    /// `next_hop_to(d)`: `d` itself if directly reachable,
    /// else the learned next hop, else `None`.
    pub fn next_hop_to(&self, destination: &str, hellos: &HelloRouter) -> Option<String> {
        self.prune_direct_neighbours(hellos);
        if hellos.is_reachable(destination) {
            return Some(destination.to_string());
        }
        self.table.read().unwrap().next_hop.get(destination).cloned()
    }

    pub fn metric_to(&self, destination: &str) -> Option<f64> {
        self.table.read().unwrap().metric.get(destination).copied()
    }

    pub fn distant_peers(&self) -> Vec<(String, String, f64)> {
        let table = self.table.read().unwrap();
        table
            .next_hop
            .iter()
            .map(|(dest, next)| (dest.clone(), next.clone(), table.metric.get(dest).copied().unwrap_or(f64::INFINITY)))
            .collect()
    }

    pub fn invalidate(&self) {
        let mut table = self.table.write().unwrap();
        table.next_hop.clear();
        table.metric.clear();
        self.logger.debug("roads table invalidated".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::hellos::RouterTag;
    use std::time::Duration;

    fn hellos_with(neighbour: &str, metric: f64) -> HelloRouter {
        let hellos = HelloRouter::new(RouterTag::Router, Duration::from_secs(1), Duration::from_secs(3), 0.0);
        hellos.send_hello(neighbour);
        hellos.handle_reply(neighbour, "herald/routing/reply/N/");
        hellos.change_metric(neighbour, metric);
        hellos
    }

    #[test]
    fn advertisement_applies_distance_vector_and_split_horizon() {
        let roads = RoadsRouter::new(Duration::from_secs(1));
        let hellos_at_r = hellos_with("A", 0.01);

        let mut from_r: HashMap<String, f64> = HashMap::new();
        from_r.insert("B".to_string(), 0.02);
        roads.handle_advertisement("R", &from_r, &hellos_at_r);

        assert_eq!(roads.next_hop_to("B", &hellos_at_r), Some("R".to_string()));
        assert!((roads.metric_to("B").unwrap() - 0.02).abs() < 1e-9);

        let ad_to_r = roads.build_advertisement("R", &hellos_at_r);
        assert!(!ad_to_r.contains_key("B"), "split horizon must exclude B from the advertisement back to R");
    }

    #[test]
    fn poison_drops_entries_learned_through_sender() {
        let roads = RoadsRouter::new(Duration::from_secs(1));
        let hellos = hellos_with("R", 0.01);

        let mut from_r: HashMap<String, f64> = HashMap::new();
        from_r.insert("B".to_string(), 0.02);
        roads.handle_advertisement("R", &from_r, &hellos);
        assert_eq!(roads.next_hop_to("B", &hellos), Some("R".to_string()));

        roads.handle_advertisement("R", &HashMap::new(), &hellos);
        assert_eq!(roads.next_hop_to("B", &hellos), None);
    }

    #[test]
    fn direct_neighbour_pruned_from_distance_table() {
        let roads = RoadsRouter::new(Duration::from_secs(1));
        let hellos = hellos_with("R", 0.01);

        let mut from_r: HashMap<String, f64> = HashMap::new();
        from_r.insert("R".to_string(), 0.05);
        roads.handle_advertisement("R", &from_r, &hellos);

        assert_eq!(roads.next_hop_to("R", &hellos), Some("R".to_string()));
    }
}
