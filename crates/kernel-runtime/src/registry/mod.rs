//! # Bean Registry
//!
//! Name-keyed store of the services a kernel manages.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      BeanRegistry                        │
//! │                                                          │
//! │  #1 "db"   ── Arc<Db>, Arc<dyn Service>, Arc<dyn Store>  │
//! │  #2 "web"  ── Arc<Web>, Arc<dyn Service>                 │
//! │  #3 "jobs" ── Arc<Jobs>, Arc<dyn Service>, Arc<dyn Store>│
//! │                                                          │
//! │  by name + type ─► entry, then handle check              │
//! │  by type only   ─► first registered entry with handle    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each entry holds the handles it can be resolved as: its concrete
//! `Arc<S>`, `Arc<dyn Service>` and whatever the service exposes.

mod inject;
mod service;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kernel_bus::{Payload, SourceId};
use parking_lot::RwLock;
use tracing::{debug, warn};

pub use inject::{Inject, InjectBy, InjectTarget, InjectionPoint};
pub use service::{Exposure, Service};

/// Names no service may take (compared case-insensitively).
pub const RESERVED_NAMES: [&str; 3] = ["sys", "env", "log"];

/// A registered service.
pub struct Bean {
    name: String,
    source: SourceId,
    type_name: &'static str,
    service: Arc<dyn Service>,
    handles: HashMap<TypeId, Payload>,
}

impl Bean {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event source the service's handlers are registered under.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Handle of type `type_id`, if the bean is resolvable as that type.
    pub fn handle(&self, type_id: TypeId) -> Option<&Payload> {
        self.handles.get(&type_id)
    }

    pub fn is(&self, type_id: TypeId) -> bool {
        self.handles.contains_key(&type_id)
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("handles", &self.handles.len())
            .finish()
    }
}

/// One resolution request, as carried by the `bean.get` event.
#[derive(Debug, Clone)]
pub struct BeanRequest {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub name: Option<String>,
    /// Who asks; synthetic beans are scoped to it.
    pub caller: Option<SourceId>,
}

impl BeanRequest {
    pub fn of<T: Any>(name: Option<&str>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: name.map(str::to_string),
            caller: None,
        }
    }

    #[must_use]
    pub fn from_caller(mut self, caller: Option<SourceId>) -> Self {
        self.caller = caller;
        self
    }
}

/// Additional bean source consulted after the registry.
///
/// The answer must hold a value of the requested type.
pub trait BeanResolver: Send + Sync {
    fn resolve(&self, request: &BeanRequest) -> Option<Payload>;
}

impl<F> BeanResolver for F
where
    F: Fn(&BeanRequest) -> Option<Payload> + Send + Sync,
{
    fn resolve(&self, request: &BeanRequest) -> Option<Payload> {
        self(request)
    }
}

/// Registered services in registration order.
#[derive(Default)]
pub struct BeanRegistry {
    beans: RwLock<Vec<Arc<Bean>>>,
}

impl BeanRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reserved(name: &str) -> bool {
        RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
    }

    /// Store a service. Reserved, empty or taken names are refused with a
    /// warning and `None`.
    pub fn insert<S: Service>(
        &self,
        name: &str,
        source: SourceId,
        service: Arc<S>,
    ) -> Option<Arc<Bean>> {
        if name.is_empty() || Self::is_reserved(name) {
            warn!(name, "[registry] Refusing reserved service name");
            return None;
        }

        let mut exposure = Exposure::new();
        exposure.expose(Arc::clone(&service));
        exposure.expose(Arc::clone(&service) as Arc<dyn Service>);
        Arc::clone(&service).exposes(&mut exposure);

        let bean = Arc::new(Bean {
            name: name.to_string(),
            source,
            type_name: std::any::type_name::<S>(),
            service,
            handles: exposure.into_handles(),
        });

        let mut beans = self.beans.write();
        if beans.iter().any(|b| b.name == name) {
            warn!(name, "[registry] Service name already registered, ignoring");
            return None;
        }
        beans.push(Arc::clone(&bean));
        debug!(name, kind = bean.type_name, "[registry] Service stored");
        Some(bean)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bean>> {
        self.beans.read().iter().find(|b| b.name == name).cloned()
    }

    /// Name and/or type lookup. With a name the type must match that
    /// entry; without one the first registered match wins.
    pub fn lookup(&self, type_id: TypeId, name: Option<&str>) -> Option<Payload> {
        let beans = self.beans.read();
        match name {
            Some(name) => beans
                .iter()
                .find(|b| b.name == name)
                .and_then(|b| b.handle(type_id).cloned()),
            None => beans.iter().find_map(|b| b.handle(type_id).cloned()),
        }
    }

    /// Typed convenience over [`lookup`](Self::lookup).
    pub fn lookup_as<T: Any + Clone>(&self, name: Option<&str>) -> Option<T> {
        self.lookup(TypeId::of::<T>(), name)
            .and_then(|payload| payload.downcast_ref::<T>().cloned())
    }

    /// Bean owning event source `source`.
    pub fn by_source(&self, source: &SourceId) -> Option<Arc<Bean>> {
        self.beans
            .read()
            .iter()
            .find(|b| &b.source == source)
            .cloned()
    }

    /// Bean whose service is this exact instance.
    pub fn by_instance(&self, service: &Arc<dyn Service>) -> Option<Arc<Bean>> {
        let wanted = Arc::as_ptr(service) as *const ();
        self.beans
            .read()
            .iter()
            .find(|b| Arc::as_ptr(&b.service) as *const () == wanted)
            .cloned()
    }

    /// Snapshot of every bean, in registration order.
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.beans.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.beans.read().iter().map(|b| b.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.beans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.read().is_empty()
    }
}

impl fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("names", &self.names())
            .finish()
    }
}
