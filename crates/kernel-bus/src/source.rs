//! # Event Sources
//!
//! Every fire and every handler registration is attributed to a [`SourceId`].
//! Identity is a process-unique key handed out at construction; the label is
//! only for humans. Two sources with the same label are still different
//! sources, so nobody can impersonate the kernel by picking its name.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Unforgeable identity of an event source.
#[derive(Clone)]
pub struct SourceId {
    key: u64,
    label: Arc<str>,
}

impl SourceId {
    /// Allocate a fresh identity with a display label.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        }
    }

    /// Allocate an identity for a caller that has no name.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process-unique key.
    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl PartialEq for SourceId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SourceId {}

impl Hash for SourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.key)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
