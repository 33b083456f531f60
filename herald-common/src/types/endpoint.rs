// Exported-service ("endpoint") bean and its JSON dump, exchanged during
// `herald/rpc/discovery/contact|add|update|remove`.
//
// Grounded on `herald/beans.py`'s `Endpoint`/`ExportEndpoint`: a service
// instance described by its provider peer, its stable `service_<id>` name,
// and the OSGi-remote-services-flavored property bag the original carries
// across the wire even though only `specifications` is load-bearing here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One exported service instance, as advertised to a remote peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub uid: String,
    pub peer: String,
    pub name: String,
    pub specifications: Vec<String>,
    #[serde(default)]
    pub configurations: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Endpoint {
    /// Builds the endpoint record for a single `(spec, service_name)` pair
    /// provided by `peer_uid`, filling in the property bag the original
    /// always sends alongside `specifications`.
    pub fn new(uid: impl Into<String>, peer_uid: impl Into<String>, service_name: impl Into<String>, spec: &str) -> Self {
        let uid = uid.into();
        let peer = peer_uid.into();
        let name = service_name.into();
        let mut properties = HashMap::new();
        properties.insert("herald.rpc.peer".to_string(), peer.clone());
        properties.insert("herald.rpc.subject".to_string(), crate::rpc::SUBJECT_XMLRPC.to_string());
        properties.insert("objectClass".to_string(), spec.to_string());
        properties.insert("endpoint.framework.uuid".to_string(), peer.clone());
        properties.insert("endpoint.service.id".to_string(), uid.clone());
        properties.insert("service.imported".to_string(), "true".to_string());
        properties.insert("service.imported.configs".to_string(), "herald-xmlrpc".to_string());
        properties.insert("instance.name".to_string(), name.clone());

        Self {
            uid,
            peer,
            name,
            specifications: vec![format!("python:/{spec}")],
            configurations: vec!["herald-xmlrpc".to_string()],
            properties,
        }
    }

    /// The bare spec string, stripping the `python:/` prefix the wire
    /// format carries for legacy-compatibility reasons. Falls back to the
    /// raw first specification if the prefix isn't present.
    pub fn spec(&self) -> Option<&str> {
        let first = self.specifications.first()?;
        Some(first.strip_prefix("python:/").unwrap_or(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_strips_the_python_prefix() {
        let endpoint = Endpoint::new("e1", "peer-a", "service_1", "led.on");
        assert_eq!(endpoint.spec(), Some("led.on"));
    }

    #[test]
    fn round_trips_through_json() {
        let endpoint = Endpoint::new("e1", "peer-a", "service_1", "led.on");
        let json = serde_json::to_value(&endpoint).unwrap();
        let back: Endpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back.spec(), Some("led.on"));
        assert_eq!(back.name, "service_1");
    }
}
