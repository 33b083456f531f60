// External device-discovery collaborator.
//
// Grounded on `herald/transports/bluetooth/discovery.py`: a periodic scan
// filtered by a device-name allow-list, diffed against the previous
// snapshot; a scan error must not clear the last-known set.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

pub type NewDeviceCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type DelDeviceCallback = Arc<dyn Fn(String) + Send + Sync>;

pub trait DeviceDiscovery: Send + Sync {
    fn devices(&self) -> HashSet<String>;
    fn listen_new(&self, f: NewDeviceCallback);
    fn listen_del(&self, f: DelDeviceCallback);
}

/// One scan of the underlying medium. Implementations: an OS Bluetooth
/// scan restricted to an allow-list of device names, a fixed serial port
/// list, or — in tests — a scripted sequence of snapshots.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self) -> anyhow::Result<HashSet<String>>;
}

struct Listeners {
    new: Vec<NewDeviceCallback>,
    del: Vec<DelDeviceCallback>,
}

/// Periodic scanner that diffs against the last-known snapshot and fires
/// new/del callbacks for the difference. A failed scan leaves the
/// last-known set untouched.
pub struct PeriodicDiscovery {
    known: Mutex<HashSet<String>>,
    listeners: Mutex<Listeners>,
}

impl PeriodicDiscovery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            known: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Listeners {
                new: Vec::new(),
                del: Vec::new(),
            }),
        })
    }

    /// Spawns the periodic scan loop. Runs until the returned join handle
    /// is aborted.
    pub fn spawn(self: &Arc<Self>, scanner: Arc<dyn Scanner>, period: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                this.tick(scanner.as_ref()).await;
            }
        })
    }

    async fn tick(&self, scanner: &dyn Scanner) {
        let seen = match scanner.scan().await {
            Ok(seen) => seen,
            Err(_) => return,
        };
        let (added, removed) = {
            let mut known = self.known.lock().expect("discovery mutex poisoned");
            let added: Vec<String> = seen.difference(&known).cloned().collect();
            let removed: Vec<String> = known.difference(&seen).cloned().collect();
            *known = seen;
            (added, removed)
        };
        let listeners = self.listeners.lock().expect("discovery mutex poisoned");
        for addr in added {
            for f in &listeners.new {
                f(addr.clone());
            }
        }
        for addr in removed {
            for f in &listeners.del {
                f(addr.clone());
            }
        }
    }
}

impl DeviceDiscovery for PeriodicDiscovery {
    fn devices(&self) -> HashSet<String> {
        self.known.lock().expect("discovery mutex poisoned").clone()
    }

    fn listen_new(&self, f: NewDeviceCallback) {
        self.listeners.lock().expect("discovery mutex poisoned").new.push(f);
    }

    fn listen_del(&self, f: DelDeviceCallback) {
        self.listeners.lock().expect("discovery mutex poisoned").del.push(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedScanner {
        snapshots: Mutex<std::collections::VecDeque<anyhow::Result<HashSet<String>>>>,
    }

    #[async_trait]
    impl Scanner for ScriptedScanner {
        async fn scan(&self) -> anyhow::Result<HashSet<String>> {
            self.snapshots
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HashSet::new()))
        }
    }

    #[tokio::test]
    async fn scan_error_preserves_last_known_set() {
        let discovery = PeriodicDiscovery::new();
        let scanner = ScriptedScanner {
            snapshots: Mutex::new(
                vec![
                    Ok(["aa:aa".to_string()].into_iter().collect()),
                    Err(anyhow::anyhow!("scan failed")),
                ]
                .into(),
            ),
        };

        discovery.tick(&scanner).await;
        assert_eq!(discovery.devices().len(), 1);

        discovery.tick(&scanner).await;
        assert_eq!(discovery.devices().len(), 1, "failed scan must not clear the known set");
    }

    #[tokio::test]
    async fn diff_fires_new_and_del_callbacks() {
        let discovery = PeriodicDiscovery::new();
        let new_count = Arc::new(AtomicUsize::new(0));
        let del_count = Arc::new(AtomicUsize::new(0));
        let nc = new_count.clone();
        let dc = del_count.clone();
        discovery.listen_new(Arc::new(move |_| {
            nc.fetch_add(1, Ordering::SeqCst);
        }));
        discovery.listen_del(Arc::new(move |_| {
            dc.fetch_add(1, Ordering::SeqCst);
        }));

        let scanner = ScriptedScanner {
            snapshots: Mutex::new(
                vec![
                    Ok(["aa:aa".to_string()].into_iter().collect()),
                    Ok(["bb:bb".to_string()].into_iter().collect()),
                ]
                .into(),
            ),
        };

        discovery.tick(&scanner).await;
        discovery.tick(&scanner).await;
        assert_eq!(new_count.load(Ordering::SeqCst), 2);
        assert_eq!(del_count.load(Ordering::SeqCst), 1);
    }
}
