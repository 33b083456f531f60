// Service container: component registration and the activation lifecycle.
//
// Grounded on `herald/services/container.py`'s `Container`, with the
// decorator-driven registration replaced by an explicit builder
// ("Reactive registration replacing decorators").

use herald_common::errors::HeraldError;
use herald_common::logging::{Component, Logger};
use herald_common::rpc::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A required dependency of a component: the service name it needs and
/// whether the component can run without it.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub spec: String,
    pub optional: bool,
}

/// Lifecycle hooks a component may implement, in place of the source's
/// decorator-bound instance methods.
pub struct Hooks {
    pub validate: Option<Box<dyn Fn() -> Result<(), String> + Send + Sync>>,
    pub invalidate: Option<Box<dyn Fn() + Send + Sync>>,
    pub bind_field: Option<Box<dyn Fn(&str, RemoteHandle) + Send + Sync>>,
    pub unbind_field: Option<Box<dyn Fn(&str) + Send + Sync>>,
    /// Answers an incoming RPC member call while the component is active,
    /// mirroring `MicroComponent::call` on the micronode side.
    pub call: Option<Box<dyn Fn(&str, &[Value]) -> Result<Vec<Value>, HeraldError> + Send + Sync>>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            validate: None,
            invalidate: None,
            bind_field: None,
            unbind_field: None,
            call: None,
        }
    }
}

/// A bound requirement: either the locally-registered component object or
/// a proxy to a remote provider.
#[derive(Debug, Clone)]
pub enum RemoteHandle {
    Local,
    Remote { peer_uid: String, service_name: String },
}

/// A component declaration submitted to the container via a builder.
pub struct ComponentSpec {
    pub name: String,
    pub provides: Vec<String>,
    pub requires: Vec<Requirement>,
    pub properties: HashMap<String, serde_json::Value>,
    pub hooks: Hooks,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provides: Vec::new(),
            requires: Vec::new(),
            properties: HashMap::new(),
            hooks: Hooks::default(),
        }
    }

    pub fn provides(mut self, spec: impl Into<String>) -> Self {
        self.provides.push(spec.into());
        self
    }

    pub fn requires(mut self, spec: impl Into<String>, optional: bool) -> Self {
        self.requires.push(Requirement { spec: spec.into(), optional });
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

struct ComponentInfo {
    spec: ComponentSpec,
    active: bool,
    bound: HashMap<String, Option<RemoteHandle>>,
}

struct State {
    components: HashMap<String, ComponentInfo>,
    /// spec -> providing peer uids, in registration order.
    external_services: HashMap<String, Vec<String>>,
    /// (peer, spec) -> service name.
    peer_service_names: HashMap<(String, String), String>,
}

/// Component registry and activation engine. One `Mutex` guards
/// `_component_info`/`_external_services`/`_class_binding` equivalents,
/// acquired around every mutating call.
pub struct Container {
    state: Mutex<State>,
    logger: Logger,
}

impl Container {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                components: HashMap::new(),
                external_services: HashMap::new(),
                peer_service_names: HashMap::new(),
            }),
            logger: Logger::new_root(Component::Container, "container".to_string()),
        })
    }

    pub fn register(&self, spec: ComponentSpec) {
        let mut state = self.state.lock().unwrap();
        let name = spec.name.clone();
        state.components.insert(
            name,
            ComponentInfo {
                spec,
                active: false,
                bound: HashMap::new(),
            },
        );
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.state.lock().unwrap().components.get(name).map(|c| c.active).unwrap_or(false)
    }

    /// `add_service(spec, peer, name)`: append to the
    /// provider list (idempotent on duplicates); for each component
    /// requiring `spec`, start it if inactive, else inject a fresh
    /// `RemoteObject` if the bound handle was empty.
    pub fn add_service(&self, spec: &str, peer_uid: &str, service_name: &str) {
        let mut state = self.state.lock().unwrap();

        let providers = state.external_services.entry(spec.to_string()).or_default();
        if !providers.contains(&peer_uid.to_string()) {
            providers.push(peer_uid.to_string());
        }
        state
            .peer_service_names
            .insert((peer_uid.to_string(), spec.to_string()), service_name.to_string());

        let consumer_names: Vec<String> = state
            .components
            .iter()
            .filter(|(_, info)| info.spec.requires.iter().any(|r| r.spec == spec))
            .map(|(name, _)| name.clone())
            .collect();

        for name in consumer_names {
            self.try_start_or_inject(&mut state, &name, spec, peer_uid, service_name);
        }
    }

    fn try_start_or_inject(&self, state: &mut State, consumer: &str, spec: &str, peer_uid: &str, service_name: &str) {
        let was_active = state.components.get(consumer).map(|c| c.active).unwrap_or(false);
        if !was_active {
            self.start_component_locked(state, consumer);
            return;
        }
        if let Some(info) = state.components.get_mut(consumer) {
            let slot = info.bound.entry(spec.to_string()).or_insert(None);
            if slot.is_none() {
                let handle = RemoteHandle::Remote {
                    peer_uid: peer_uid.to_string(),
                    service_name: service_name.to_string(),
                };
                *slot = Some(handle.clone());
                if let Some(bind) = &info.spec.hooks.bind_field {
                    bind(spec, handle);
                }
            }
        }
    }

    /// `remove_service(spec, peer)`: clear bound handles for
    /// required-optional consumers (firing `unbind_field`), and
    /// `remove_component` required-non-optional consumers (cascading).
    pub fn remove_service(&self, spec: &str, peer_uid: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(providers) = state.external_services.get_mut(spec) {
            providers.retain(|p| p != peer_uid);
        }
        state.peer_service_names.remove(&(peer_uid.to_string(), spec.to_string()));

        let consumers: Vec<(String, bool)> = state
            .components
            .iter()
            .filter_map(|(name, info)| {
                info.spec
                    .requires
                    .iter()
                    .find(|r| r.spec == spec)
                    .map(|r| (name.clone(), r.optional))
            })
            .collect();

        for (name, optional) in consumers {
            if optional {
                if let Some(info) = state.components.get_mut(&name) {
                    info.bound.insert(spec.to_string(), None);
                    if let Some(unbind) = &info.spec.hooks.unbind_field {
                        unbind(spec);
                    }
                }
            } else {
                self.remove_component_locked(&mut state, &name);
            }
        }
    }

    /// `start_component`: short-circuits `false` if any
    /// non-optional requirement has no provider; else binds requirement
    /// handles, marks active, calls `validate`.
    pub fn start_component(&self, name: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        self.start_component_locked(&mut state, name)
    }

    fn start_component_locked(&self, state: &mut State, name: &str) -> bool {
        let Some(info) = state.components.get(name) else {
            return false;
        };
        if info.active {
            return true;
        }
        for req in &info.spec.requires {
            if req.optional {
                continue;
            }
            let has_remote = state.external_services.get(&req.spec).is_some_and(|p| !p.is_empty());
            let has_local = state
                .components
                .values()
                .any(|i| i.active && i.spec.provides.iter().any(|p| p == &req.spec));
            if !has_remote && !has_local {
                return false;
            }
        }

        let requires = state.components.get(name).unwrap().spec.requires.clone();
        let mut bound = HashMap::new();
        for req in &requires {
            let handle = self.best_provider_handle(state, &req.spec);
            bound.insert(req.spec.clone(), handle);
        }

        let validation = state
            .components
            .get(name)
            .and_then(|info| info.spec.hooks.validate.as_ref())
            .map(|v| v());

        if let Some(Err(reason)) = validation {
            self.logger.warn(format!("{name}: validate vetoed activation: {reason}"));
            return false;
        }

        if let Some(info) = state.components.get_mut(name) {
            info.bound = bound;
            info.active = true;
        }
        self.logger.debug(format!("{name} activated"));
        true
    }

    fn best_provider_handle(&self, state: &State, spec: &str) -> Option<RemoteHandle> {
        let locally_provided = state
            .components
            .values()
            .any(|info| info.active && info.spec.provides.iter().any(|p| p == spec));
        if locally_provided {
            return Some(RemoteHandle::Local);
        }
        let peer_uid = state.external_services.get(spec)?.first()?.clone();
        let service_name = state.peer_service_names.get(&(peer_uid.clone(), spec.to_string()))?.clone();
        Some(RemoteHandle::Remote { peer_uid, service_name })
    }

    /// `remove_component`: marks inactive, calls
    /// `invalidate`, propagates removal of whatever this component
    /// provided to components that depended on it.
    pub fn remove_component(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        self.remove_component_locked(&mut state, name);
    }

    fn remove_component_locked(&self, state: &mut State, name: &str) {
        let provides = match state.components.get_mut(name) {
            Some(info) if info.active => {
                info.active = false;
                let provides = info.spec.provides.clone();
                if let Some(invalidate) = &info.spec.hooks.invalidate {
                    invalidate();
                }
                provides
            }
            _ => return,
        };
        self.logger.debug(format!("{name} deactivated"));

        for spec in provides {
            let cascading: Vec<String> = state
                .components
                .iter()
                .filter(|(consumer_name, info)| {
                    *consumer_name != name
                        && info.active
                        && info.spec.requires.iter().any(|r| !r.optional && r.spec == spec)
                })
                .map(|(n, _)| n.clone())
                .collect();
            for consumer in cascading {
                self.remove_component_locked(state, &consumer);
            }
        }
    }

    pub fn service_id_for(&self, spec: &str) -> u64 {
        service_id_from_spec(spec)
    }

    /// Resolves `service_id` (as carried in a `service_<id>.<member>` RPC
    /// method name) to the active local component providing it, and
    /// invokes its `call` hook. Mirrors `MicroContainer::dispatch_call`.
    pub fn dispatch_call(&self, service_id: &str, member: &str, args: &[Value]) -> Result<Vec<Value>, HeraldError> {
        let state = self.state.lock().unwrap();
        let info = state
            .components
            .values()
            .find(|info| info.active && info.spec.provides.iter().any(|spec| service_id_from_spec(spec).to_string() == service_id))
            .ok_or_else(|| HeraldError::NoProvider(service_id.to_string()))?;
        let call = info
            .spec
            .hooks
            .call
            .as_ref()
            .ok_or_else(|| HeraldError::NoProvider(format!("{}.{}", info.spec.name, member)))?;
        call(member, args)
    }

    /// Every spec currently provided by an active local component, as the
    /// `Endpoint` records advertised over `herald/rpc/discovery/contact|add`.
    pub fn local_endpoints(&self, local_peer_uid: &str) -> Vec<herald_common::types::Endpoint> {
        let state = self.state.lock().unwrap();
        state
            .components
            .values()
            .filter(|info| info.active)
            .flat_map(|info| info.spec.provides.iter())
            .map(|spec| {
                let id = service_id_from_spec(spec);
                let name = format!("service_{id}");
                herald_common::types::Endpoint::new(format!("{local_peer_uid}/{name}"), local_peer_uid, name, spec)
            })
            .collect()
    }
}

pub use herald_common::rpc::{service_id_from_spec, service_name_from_id};

/// One entry submitted by `#[herald_macros::component(...)]` at link time.
/// `Container::register_inventory` walks every collected descriptor and
/// registers the `ComponentSpec` it builds.
pub struct ComponentDescriptor {
    pub build: fn() -> ComponentSpec,
}

inventory::collect!(ComponentDescriptor);

impl Container {
    /// Registers every component declared anywhere in the binary via
    /// `#[component(...)]`.
    pub fn register_inventory(&self) {
        for descriptor in inventory::iter::<ComponentDescriptor> {
            self.register((descriptor.build)());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_requires_all_non_optional_providers() {
        let container = Container::new();
        container.register(ComponentSpec::new("consumer").requires("led.on", false));
        assert!(!container.is_active("consumer"));

        container.add_service("led.on", "peer-1", "service_1");
        assert!(container.is_active("consumer"));
    }

    #[test]
    fn removing_last_provider_deactivates_consumer() {
        let container = Container::new();
        container.register(ComponentSpec::new("consumer").requires("led.on", false));
        container.add_service("led.on", "peer-1", "service_1");
        assert!(container.is_active("consumer"));

        container.remove_service("led.on", "peer-1");
        assert!(!container.is_active("consumer"));
    }

    #[test]
    fn deactivation_cascades_through_transitive_consumers() {
        let container = Container::new();
        container.register(ComponentSpec::new("hub").provides("hub.ready").requires("led.on", false));
        container.register(ComponentSpec::new("ui").requires("hub.ready", false));

        assert!(!container.is_active("ui"), "ui requires hub.ready, not yet provided by anything");

        container.add_service("led.on", "peer-1", "service_1");
        assert!(container.is_active("hub"), "hub's only requirement is now satisfied remotely");

        assert!(container.start_component("ui"), "hub is active and provides hub.ready, so ui should activate locally");
        assert!(container.is_active("ui"));

        container.remove_service("led.on", "peer-1");
        assert!(!container.is_active("hub"));
        assert!(!container.is_active("ui"), "ui's sole provider of hub.ready just deactivated");
    }

    #[test]
    fn service_id_is_injective_for_distinct_specs() {
        assert_ne!(service_id_from_spec("a"), service_id_from_spec("b"));
        assert_eq!(service_id_from_spec("a"), service_id_from_spec("a"));
    }

    #[test]
    fn local_endpoints_lists_only_active_providers() {
        let container = Container::new();
        container.register(ComponentSpec::new("led").provides("led.on"));
        assert!(container.local_endpoints("local-peer").is_empty());

        container.start_component("led");
        let endpoints = container.local_endpoints("local-peer");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].spec(), Some("led.on"));
        assert_eq!(endpoints[0].peer, "local-peer");
    }

    #[test]
    fn dispatch_call_reaches_the_active_providers_call_hook() {
        let container = Container::new();
        let mut hooks = Hooks::default();
        hooks.call = Some(Box::new(|member, args| match member {
            "echo" => Ok(args.to_vec()),
            _ => Err(HeraldError::NoProvider(member.to_string())),
        }));
        container.register(ComponentSpec::new("echo").provides("pyboard.echo").with_hooks(hooks));

        let service_id = service_id_from_spec("pyboard.echo").to_string();
        assert!(matches!(
            container.dispatch_call(&service_id, "echo", &[]),
            Err(HeraldError::NoProvider(_))
        ));

        container.start_component("echo");
        let result = container.dispatch_call(&service_id, "echo", &[Value::Int(7)]).unwrap();
        assert_eq!(result, vec![Value::Int(7)]);
    }
}
