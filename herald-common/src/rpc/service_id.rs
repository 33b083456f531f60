// Numeric service ids shared by the host node's container and the
// micronode's: both export components as `service_<id>` over RPC, and
// both need the same injective, process-monotonic mapping from a
// requirement string to its id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);
static SERVICE_IDS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

/// Assigns each distinct requirement string a numeric service id the
/// first time it's seen in this process, and returns that same id on
/// every later call. Ids are handed out in declaration order starting
/// at 1, used to build the `service_<id>` names exported over RPC.
pub fn service_id_from_spec(spec: &str) -> u64 {
    let table = SERVICE_IDS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut table = table.lock().unwrap();
    if let Some(&id) = table.get(spec) {
        return id;
    }
    let id = NEXT_SERVICE_ID.fetch_add(1, Ordering::SeqCst);
    table.insert(spec.to_string(), id);
    id
}

/// Converts a numeric service id back to the `service_<id>` wire name.
pub fn service_name_from_id(id: u64) -> String {
    format!("service_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_is_injective_for_distinct_specs() {
        assert_ne!(service_id_from_spec("pyboard.a"), service_id_from_spec("pyboard.b"));
        assert_eq!(service_id_from_spec("pyboard.a"), service_id_from_spec("pyboard.a"));
    }
}
