// Access descriptors: a tagged record whose variant is determined by the
// access-id that produced it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

pub const ACCESS_ID_BLUETOOTH: &str = "bluetooth";
pub const ACCESS_ID_HTTP: &str = "http";

/// A Bluetooth access: a MAC address and an optional friendly device name.
///
/// NOTE: the original `cohorte-herald` `BluetoothAccess.__lt__`/`__eq__` are
/// written without `return` statements and therefore always evaluate to
/// their implicit `False`/`None` fallthrough. This port compares MAC addresses correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothAccess {
    pub mac: String,
    pub name: Option<String>,
}

impl BluetoothAccess {
    pub fn new(mac: impl Into<String>, name: Option<String>) -> Self {
        Self {
            mac: mac.into(),
            name,
        }
    }

    /// `(mac, name)` dump suitable for embedding in a peer dump.
    pub fn dump(&self) -> serde_json::Value {
        serde_json::json!([self.mac, self.name])
    }

    pub fn load(data: &serde_json::Value) -> Option<Self> {
        let arr = data.as_array()?;
        let mac = arr.first()?.as_str()?.to_string();
        let name = arr
            .get(1)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Some(Self { mac, name })
    }
}

impl PartialEq for BluetoothAccess {
    fn eq(&self, other: &Self) -> bool {
        self.mac == other.mac
    }
}

impl Eq for BluetoothAccess {}

impl Hash for BluetoothAccess {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mac.hash(state);
    }
}

impl PartialOrd for BluetoothAccess {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BluetoothAccess {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mac.cmp(&other.mac)
    }
}

/// A peer's access on a given access-id, tagged by which kind it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "access_id", content = "data")]
pub enum AccessDescriptor {
    Bluetooth(BluetoothAccess),
    /// Catch-all for access kinds this workspace doesn't special-case
    /// (e.g. `http`): preserved opaquely so the Directory can still
    /// dump/load/pass it through.
    Opaque {
        access_id: String,
        data: serde_json::Value,
    },
}

impl AccessDescriptor {
    pub fn access_id(&self) -> &str {
        match self {
            AccessDescriptor::Bluetooth(_) => ACCESS_ID_BLUETOOTH,
            AccessDescriptor::Opaque { access_id, .. } => access_id,
        }
    }

    pub fn dump(&self) -> serde_json::Value {
        match self {
            AccessDescriptor::Bluetooth(b) => b.dump(),
            AccessDescriptor::Opaque { data, .. } => data.clone(),
        }
    }

    pub fn load(access_id: &str, data: &serde_json::Value) -> Option<Self> {
        match access_id {
            ACCESS_ID_BLUETOOTH => BluetoothAccess::load(data).map(AccessDescriptor::Bluetooth),
            other => Some(AccessDescriptor::Opaque {
                access_id: other.to_string(),
                data: data.clone(),
            }),
        }
    }
}
