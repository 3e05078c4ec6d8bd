//! Request-scoped trace identifiers.
//!
//! Every batch call has a root [`TraceContext`]; each batch item runs under a
//! child context whose id is fresh and whose parent is the call's id. The ids
//! only feed logs and spans, nothing branches on them.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque correlation id (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Trace id of the current unit of work plus the id it was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceContext {
    pub id: TraceId,
    pub parent: Option<TraceId>,
}

impl TraceContext {
    pub fn new_root() -> Self {
        Self {
            id: TraceId::new(),
            parent: None,
        }
    }

    /// Uses an id received from upstream (e.g. a request header) as the root.
    pub const fn from_id(id: TraceId) -> Self {
        Self { id, parent: None }
    }

    /// Derives a child context with a fresh id whose parent is `self`.
    pub fn child(&self) -> Self {
        let mut id = TraceId::new();
        // A child never shares its parent's id.
        while id == self.id {
            id = TraceId::new();
        }
        Self {
            id,
            parent: Some(self.id),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new_root()
    }
}
