//! # Lazy Singleton
//!
//! Deferred, memoized construction of a value shared across threads.
//!
//! ```text
//!   caller A ──┐                        ┌── &T (same instance)
//!   caller B ──┼──► [init lock] ─► supplier() ─► OnceLock ──┼── &T
//!   caller C ──┘   (late callers block)              └── &T
//! ```
//!
//! A failing (or panicking) supplier leaves the singleton empty; the next
//! access runs the supplier again.

use std::convert::Infallible;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;

type Supplier<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// A value built on first access, at most once.
pub struct LazySingleton<T, E = Infallible> {
    cell: OnceLock<T>,
    init: Mutex<()>,
    supplier: Supplier<T, E>,
}

impl<T, E> LazySingleton<T, E> {
    /// Singleton whose supplier may fail.
    pub fn try_new<F>(supplier: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
            supplier: Box::new(supplier),
        }
    }

    /// Return the value, constructing it if this is the first access.
    ///
    /// Concurrent first callers block until construction finishes and then
    /// all observe the same instance. Errors are returned and not cached.
    pub fn try_get(&self) -> Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let _guard = self.init.lock();
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let value = (self.supplier)()?;
        Ok(self.cell.get_or_init(|| value))
    }

    /// Whether the value has been constructed. Never triggers construction.
    pub fn done(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The value if it was already constructed.
    pub fn peek(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> LazySingleton<T, Infallible> {
    /// Singleton with an infallible supplier.
    pub fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::try_new(move || Ok(supplier()))
    }

    /// Return the value, constructing it on first access.
    pub fn get(&self) -> &T {
        match self.try_get() {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for LazySingleton<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("LazySingleton").field(value).finish(),
            None => f.write_str("LazySingleton(<pending>)"),
        }
    }
}
