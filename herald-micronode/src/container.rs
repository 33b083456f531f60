// Single-threaded service container.
//
// Grounded on `herald-node`'s `Container`: provides/requires declarations,
// add_service/remove_service/start_component/remove_component with the
// same cascading-deactivation rule. The difference is the one named in
// the cooperative-loop contract: there is no separate `bind_field`/
// `unbind_field` callback phase run later by another thread — binding
// happens synchronously, inline, inside `add_service`/`remove_service`,
// because there is only ever one execution context to run it in.

use herald_common::errors::HeraldError;
use herald_common::rpc::Value;
use std::collections::HashMap;

/// A bound requirement: either the locally-registered component or a
/// proxy to a remote provider.
#[derive(Debug, Clone)]
pub enum RemoteHandle {
    Local,
    Remote { peer_uid: String, service_name: String },
}

/// A component a micronode hosts. `run` is called once per cooperative
/// loop iteration while the component is active, mirroring the "component
/// whose class declares a run() method" step of the loop.
pub trait MicroComponent {
    fn name(&self) -> &str;
    fn provides(&self) -> &[&str] {
        &[]
    }
    /// `(requirement, optional)` pairs.
    fn requires(&self) -> &[(&str, bool)] {
        &[]
    }
    fn validate(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn invalidate(&mut self) {}
    fn bind(&mut self, _requirement: &str, _handle: RemoteHandle) {}
    fn unbind(&mut self, _requirement: &str) {}
    fn run(&mut self) {}
    fn call(&mut self, member: &str, args: &[Value]) -> Result<Vec<Value>, HeraldError> {
        let _ = args;
        Err(HeraldError::NoProvider(format!("{}.{}", self.name(), member)))
    }
}

struct Entry {
    component: Box<dyn MicroComponent>,
    active: bool,
    bound: HashMap<String, Option<RemoteHandle>>,
}

/// Registry and activation engine for a single peer's components. Every
/// method takes `&mut self`: there is no concurrent access to serialize
/// against.
#[derive(Default)]
pub struct MicroContainer {
    entries: Vec<Entry>,
    /// requirement -> providing peer uids, in registration order.
    external_services: HashMap<String, Vec<String>>,
    /// (peer, requirement) -> service name.
    peer_service_names: HashMap<(String, String), String>,
}

impl MicroContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Box<dyn MicroComponent>) {
        self.entries.push(Entry {
            component,
            active: false,
            bound: HashMap::new(),
        });
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.component.name() == name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.index_of(name).map(|i| self.entries[i].active).unwrap_or(false)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut (dyn MicroComponent + '_)> {
        let idx = self.index_of(name)?;
        Some(self.entries[idx].component.as_mut())
    }

    /// Whether `peer_uid` is currently recorded as a provider of `spec`.
    pub fn has_provider(&self, spec: &str, peer_uid: &str) -> bool {
        self.external_services.get(spec).is_some_and(|p| p.iter().any(|uid| uid == peer_uid))
    }

    /// Finds the active, locally-provided component exporting `spec`.
    pub fn provider_of(&self, spec: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.active && e.component.provides().contains(&spec))
            .map(|e| e.component.name())
    }

    /// `add_service(spec, peer, name)`: records the provider, then for
    /// every component requiring `spec`, starts it if inactive, else
    /// binds the fresh handle in place if the slot was empty.
    pub fn add_service(&mut self, spec: &str, peer_uid: &str, service_name: &str) {
        let providers = self.external_services.entry(spec.to_string()).or_default();
        if !providers.contains(&peer_uid.to_string()) {
            providers.push(peer_uid.to_string());
        }
        self.peer_service_names
            .insert((peer_uid.to_string(), spec.to_string()), service_name.to_string());

        let consumers: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.component.requires().iter().any(|(r, _)| *r == spec))
            .map(|e| e.component.name().to_string())
            .collect();

        for name in consumers {
            self.try_start_or_bind(&name, spec, peer_uid, service_name);
        }
    }

    fn try_start_or_bind(&mut self, consumer: &str, spec: &str, peer_uid: &str, service_name: &str) {
        let was_active = self.is_active(consumer);
        if !was_active {
            self.start_component(consumer);
            return;
        }
        let Some(idx) = self.index_of(consumer) else {
            return;
        };
        let already_bound = self.entries[idx].bound.get(spec).map(|h| h.is_some()).unwrap_or(false);
        if already_bound {
            return;
        }
        let handle = RemoteHandle::Remote {
            peer_uid: peer_uid.to_string(),
            service_name: service_name.to_string(),
        };
        self.entries[idx].bound.insert(spec.to_string(), Some(handle.clone()));
        self.entries[idx].component.bind(spec, handle);
    }

    /// `remove_service(spec, peer)`: unbinds optional consumers in place,
    /// cascades `remove_component` to non-optional ones.
    pub fn remove_service(&mut self, spec: &str, peer_uid: &str) {
        if let Some(providers) = self.external_services.get_mut(spec) {
            providers.retain(|p| p != peer_uid);
        }
        self.peer_service_names.remove(&(peer_uid.to_string(), spec.to_string()));

        let consumers: Vec<(String, bool)> = self
            .entries
            .iter()
            .filter_map(|e| e.component.requires().iter().find(|(r, _)| *r == spec).map(|(_, optional)| (e.component.name().to_string(), *optional)))
            .collect();

        for (name, optional) in consumers {
            if optional {
                if let Some(idx) = self.index_of(&name) {
                    self.entries[idx].bound.insert(spec.to_string(), None);
                    self.entries[idx].component.unbind(spec);
                }
            } else {
                self.remove_component(&name);
            }
        }
    }

    /// `start_component`: `false` if any non-optional requirement has no
    /// provider; else binds every requirement, marks active, validates.
    pub fn start_component(&mut self, name: &str) -> bool {
        let Some(idx) = self.index_of(name) else {
            return false;
        };
        if self.entries[idx].active {
            return true;
        }

        let requires: Vec<(String, bool)> = self.entries[idx]
            .component
            .requires()
            .iter()
            .map(|(r, optional)| (r.to_string(), *optional))
            .collect();

        for (req, optional) in &requires {
            if *optional {
                continue;
            }
            let has_remote = self.external_services.get(req).is_some_and(|p| !p.is_empty());
            let has_local = self.provider_of(req).is_some();
            if !has_remote && !has_local {
                return false;
            }
        }

        let mut bound = HashMap::new();
        for (req, _) in &requires {
            let handle = self.best_provider_handle(req);
            bound.insert(req.clone(), handle.clone());
            if let Some(h) = handle {
                self.entries[idx].component.bind(req, h);
            }
        }

        if let Err(reason) = self.entries[idx].component.validate() {
            log::warn!("{name}: validate vetoed activation: {reason}");
            return false;
        }

        self.entries[idx].bound = bound;
        self.entries[idx].active = true;
        log::debug!("{name} activated");
        true
    }

    fn best_provider_handle(&self, spec: &str) -> Option<RemoteHandle> {
        if self.provider_of(spec).is_some() {
            return Some(RemoteHandle::Local);
        }
        let peer_uid = self.external_services.get(spec)?.first()?.clone();
        let service_name = self.peer_service_names.get(&(peer_uid.clone(), spec.to_string()))?.clone();
        Some(RemoteHandle::Remote { peer_uid, service_name })
    }

    /// `remove_component`: deactivates, invalidates, cascades to
    /// active non-optional consumers of whatever it provided.
    pub fn remove_component(&mut self, name: &str) {
        let Some(idx) = self.index_of(name) else {
            return;
        };
        if !self.entries[idx].active {
            return;
        }
        self.entries[idx].active = false;
        let provides: Vec<String> = self.entries[idx].component.provides().iter().map(|s| s.to_string()).collect();
        self.entries[idx].component.invalidate();
        log::debug!("{name} deactivated");

        for spec in provides {
            let cascading: Vec<String> = self
                .entries
                .iter()
                .filter(|e| e.component.name() != name && e.active && e.component.requires().iter().any(|(r, optional)| !optional && *r == spec))
                .map(|e| e.component.name().to_string())
                .collect();
            for consumer in cascading {
                self.remove_component(&consumer);
            }
        }
    }

    /// Runs every active component's `run()` once, in registration order.
    /// This is the loop's "execute_one_tick" step.
    pub fn run_tick(&mut self) {
        for entry in &mut self.entries {
            if entry.active {
                entry.component.run();
            }
        }
    }

    pub fn dispatch_call(&mut self, name: &str, member: &str, args: &[Value]) -> Result<Vec<Value>, HeraldError> {
        let component = self.component_mut(name).ok_or_else(|| HeraldError::NoProvider(name.to_string()))?;
        component.call(member, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        state: i64,
        activated: bool,
        deactivated: bool,
    }

    impl MicroComponent for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn provides(&self) -> &[&str] {
            &["demo.counter"]
        }
        fn validate(&mut self) -> Result<(), String> {
            self.activated = true;
            Ok(())
        }
        fn invalidate(&mut self) {
            self.deactivated = true;
        }
        fn run(&mut self) {
            self.state += 1;
        }
        fn call(&mut self, member: &str, _args: &[Value]) -> Result<Vec<Value>, HeraldError> {
            match member {
                "get" => Ok(vec![Value::Int(self.state)]),
                _ => Err(HeraldError::NoProvider(member.to_string())),
            }
        }
    }

    struct Consumer {
        bound_with: Option<String>,
    }

    impl MicroComponent for Consumer {
        fn name(&self) -> &str {
            "consumer"
        }
        fn requires(&self) -> &[(&str, bool)] {
            &[("demo.counter", false)]
        }
        fn bind(&mut self, requirement: &str, _handle: RemoteHandle) {
            self.bound_with = Some(requirement.to_string());
        }
    }

    #[test]
    fn local_provider_activates_immediately() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Counter {
            state: 0,
            activated: false,
            deactivated: false,
        }));
        assert!(container.start_component("counter"));
        assert!(container.is_active("counter"));
    }

    #[test]
    fn consumer_waits_for_remote_provider_then_binds_synchronously() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Consumer { bound_with: None }));
        assert!(!container.start_component("consumer"));
        assert!(!container.is_active("consumer"));

        container.add_service("demo.counter", "host-peer", "service_1");
        assert!(container.is_active("consumer"));
    }

    #[test]
    fn run_tick_advances_only_active_components() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Counter {
            state: 0,
            activated: false,
            deactivated: false,
        }));
        container.run_tick();
        assert_eq!(container.dispatch_call("counter", "get", &[]).unwrap(), vec![Value::Int(0)]);

        container.start_component("counter");
        container.run_tick();
        container.run_tick();
        assert_eq!(container.dispatch_call("counter", "get", &[]).unwrap(), vec![Value::Int(2)]);
    }

    #[test]
    fn removing_last_provider_cascades_deactivation() {
        let mut container = MicroContainer::new();
        container.register(Box::new(Counter {
            state: 0,
            activated: false,
            deactivated: false,
        }));
        container.register(Box::new(Consumer { bound_with: None }));
        container.add_service("demo.counter", "host-peer", "service_1");
        assert!(container.is_active("consumer"));

        container.remove_service("demo.counter", "host-peer");
        assert!(!container.is_active("consumer"));
    }
}
