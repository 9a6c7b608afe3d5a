//! Injection slots.
//!
//! A service keeps collaborators in [`Inject`] slots and lists them as
//! [`InjectionPoint`]s. The kernel fills every empty slot it can resolve,
//! at registration and again when startup completes. A slot filled by the
//! service itself is never overwritten.

use std::any::{self, Any, TypeId};
use std::fmt;
use std::sync::OnceLock;

use kernel_bus::Payload;

/// A write-once collaborator slot.
pub struct Inject<T> {
    slot: OnceLock<T>,
}

impl<T> Inject<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Slot pre-filled by the caller; injection leaves it alone.
    #[must_use]
    pub fn with(value: T) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(value);
        Self { slot }
    }

    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn is_filled(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Fill the slot. Returns `false` if it already held a value.
    pub fn fill(&self, value: T) -> bool {
        self.slot.set(value).is_ok()
    }
}

impl<T> Default for Inject<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            Some(value) => f.debug_tuple("Inject").field(value).finish(),
            None => f.write_str("Inject(<empty>)"),
        }
    }
}

/// Type-erased view of a slot.
pub trait InjectTarget: Send + Sync {
    fn is_filled(&self) -> bool;

    /// Type the slot wants.
    fn wanted_type(&self) -> TypeId;

    fn wanted_type_name(&self) -> &'static str;

    /// Fill from a resolved bean. `false` if the payload has the wrong type
    /// or the slot was filled meanwhile.
    fn accept(&self, payload: &Payload) -> bool;
}

impl<T> InjectTarget for Inject<T>
where
    T: Any + Clone + Send + Sync,
{
    fn is_filled(&self) -> bool {
        Inject::is_filled(self)
    }

    fn wanted_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn wanted_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn accept(&self, payload: &Payload) -> bool {
        payload
            .downcast_ref::<T>()
            .is_some_and(|value| self.fill(value.clone()))
    }
}

/// How a point is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectBy {
    /// First bean of the wanted type.
    Type,
    /// Bean with this name (the field name when `None`), type-checked.
    Name(Option<&'static str>),
}

/// One declared dependency of a service.
pub struct InjectionPoint<'a> {
    field: &'static str,
    by: InjectBy,
    target: &'a dyn InjectTarget,
}

impl<'a> InjectionPoint<'a> {
    pub fn by_type<T>(field: &'static str, slot: &'a Inject<T>) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        Self {
            field,
            by: InjectBy::Type,
            target: slot,
        }
    }

    /// Resolve by the field name.
    pub fn by_name<T>(field: &'static str, slot: &'a Inject<T>) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        Self {
            field,
            by: InjectBy::Name(None),
            target: slot,
        }
    }

    /// Resolve by an explicit bean name.
    pub fn named<T>(field: &'static str, name: &'static str, slot: &'a Inject<T>) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        Self {
            field,
            by: InjectBy::Name(Some(name)),
            target: slot,
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn by(&self) -> InjectBy {
        self.by
    }

    /// Bean name to look up, if resolved by name.
    pub fn bean_name(&self) -> Option<&'static str> {
        match self.by {
            InjectBy::Type => None,
            InjectBy::Name(explicit) => Some(explicit.unwrap_or(self.field)),
        }
    }

    pub fn target(&self) -> &'a dyn InjectTarget {
        self.target
    }
}

impl fmt::Debug for InjectionPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("field", &self.field)
            .field("by", &self.by)
            .field("type", &self.target.wanted_type_name())
            .field("filled", &self.target.is_filled())
            .finish()
    }
}
