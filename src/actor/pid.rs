//! Actor addressing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one actor cell.
///
/// `address` is reserved for a future distributed placement layer; in this
/// single-process runtime it is always `None` and equality is decided by
/// `id` alone.
#[derive(Clone, Debug, Eq)]
pub struct Pid {
    id: u64,
    path: std::sync::Arc<str>,
    address: Option<std::sync::Arc<str>>,
}

impl Pid {
    pub(crate) fn new(path: impl Into<std::sync::Arc<str>>) -> Self {
        Pid {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            path: path.into(),
            address: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.address == other.address
    }
}

impl std::hash::Hash for Pid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.id)
    }
}
