// Logging facade shared by every Herald crate.
//
// Thin wrapper around the `log` crate that tags every record with the
// architectural component that emitted it, plus whatever scoping
// (peer/service/event path) is available at the call site. Callers hold
// an `Arc<Logger>`, derive scoped children with `with_*`, and never touch
// the `log` macros directly.

use std::fmt;
use std::sync::Arc;

/// Architectural component a log record originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Node,
    Link,
    Transport,
    Bus,
    Directory,
    Routing,
    Container,
    Rpc,
    Gateway,
    Micronode,
    Service,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Node => "node",
            Component::Link => "link",
            Component::Transport => "transport",
            Component::Bus => "bus",
            Component::Directory => "directory",
            Component::Routing => "routing",
            Component::Container => "container",
            Component::Rpc => "rpc",
            Component::Gateway => "gateway",
            Component::Micronode => "micronode",
            Component::Service => "service",
        };
        write!(f, "{s}")
    }
}

/// A scoped logger.
///
/// Cheap to clone (everything is an owned `String`/`Option<String>`); callers
/// typically hold one behind an `Arc` once created from `new_root`.
#[derive(Debug, Clone)]
pub struct Logger {
    component: Component,
    name: String,
    peer_uid: Option<String>,
    event_path: Option<String>,
}

impl Logger {
    /// Create a root logger for `component`, named `name` (typically the
    /// owning object's identity: a node name, a link's remote address).
    pub fn new_root(component: Component, name: impl Into<String>) -> Self {
        Self {
            component,
            name: name.into(),
            peer_uid: None,
            event_path: None,
        }
    }

    /// Derive a child logger scoped to a peer UID.
    pub fn with_peer(&self, peer_uid: impl Into<String>) -> Self {
        Self {
            peer_uid: Some(peer_uid.into()),
            ..self.clone()
        }
    }

    /// Derive a child logger scoped to an event/subject path.
    pub fn with_event_path(&self, event_path: impl Into<String>) -> Self {
        Self {
            event_path: Some(event_path.into()),
            ..self.clone()
        }
    }

    pub fn event_path(&self) -> Option<&str> {
        self.event_path.as_deref()
    }

    fn prefix(&self) -> String {
        let mut out = format!("[{}][{}]", self.component, self.name);
        if let Some(peer) = &self.peer_uid {
            out.push_str(&format!("[peer={peer}]"));
        }
        if let Some(path) = &self.event_path {
            out.push_str(&format!("[{path}]"));
        }
        out
    }

    pub fn debug(&self, message: impl Into<String>) {
        log::debug!("{} {}", self.prefix(), message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        log::info!("{} {}", self.prefix(), message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        log::warn!("{} {}", self.prefix(), message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        log::error!("{} {}", self.prefix(), message.into());
    }
}

/// Implemented by contexts that carry a logger plus enough scoping
/// information to tag records consistently (service path, event path).
pub trait LoggingContext {
    fn component(&self) -> Component;
    fn service_path(&self) -> Option<&str> {
        None
    }
    fn event_path(&self) -> Option<&str> {
        None
    }
    fn logger(&self) -> &Logger;
}

/// Log verbosity, independent of the `log` crate's `LevelFilter` so callers
/// don't need to depend on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Process-wide logging configuration, applied once at startup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    default_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Install this configuration as the process-wide `env_logger`.
    ///
    /// Safe to call more than once (e.g. from multiple tests in the same
    /// binary); later calls are no-ops.
    pub fn apply(&self) {
        let _ = env_logger::Builder::new()
            .filter_level(self.default_level.to_filter())
            .is_test(cfg!(test))
            .try_init();
    }
}

/// Convenience alias for the shared, cheaply cloneable logger handle.
pub type SharedLogger = Arc<Logger>;
