//! The contract every registered service implements.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use kernel_bus::{Handler, Payload};

use super::inject::InjectionPoint;

/// A module managed by the kernel.
///
/// Every method has a default, so a plain data holder is a valid service.
///
/// ```rust,ignore
/// struct Web {
///     db: Inject<Arc<Db>>,
///     exec: Inject<ServiceExecutor>,
/// }
///
/// impl Service for Web {
///     fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
///         vec![
///             InjectionPoint::by_type("db", &self.db),
///             InjectionPoint::by_type("exec", &self.exec),
///         ]
///     }
///
///     fn handlers(self: Arc<Self>) -> Vec<Handler> {
///         vec![Handler::on("sys.starting").run(move |_| self.listen())]
///     }
/// }
/// ```
pub trait Service: Any + Send + Sync {
    /// Slots the kernel should fill.
    fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
        Vec::new()
    }

    /// Event handlers, registered under this service's source.
    fn handlers(self: Arc<Self>) -> Vec<Handler> {
        Vec::new()
    }

    /// Extra handles (usually `Arc<dyn Trait>`) this service can be found by.
    fn exposes(self: Arc<Self>, exposure: &mut Exposure) {
        let _ = exposure;
    }
}

/// Handles a bean can be looked up by, keyed by handle type.
#[derive(Default)]
pub struct Exposure {
    handles: HashMap<TypeId, Payload>,
}

impl Exposure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the bean resolvable as `T`.
    pub fn expose<T>(&mut self, handle: T) -> &mut Self
    where
        T: Any + Clone + Send + Sync,
    {
        self.handles.insert(TypeId::of::<T>(), Arc::new(handle));
        self
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.handles.contains_key(&type_id)
    }

    pub(crate) fn into_handles(self) -> HashMap<TypeId, Payload> {
        self.handles
    }
}
