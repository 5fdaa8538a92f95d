//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Build identifiers use UUID v7 (time-ordered) so that history records
//! sort by creation time without a separate timestamp column.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for one build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BuildId(pub Uuid);

impl BuildId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }

    /// Short eight-character form used in chat output.
    pub fn short(&self) -> String {
        let full = self.0.simple().to_string();
        full.get(24..).map_or_else(|| full.clone(), str::to_owned)
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BuildId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BuildId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<BuildId> for Uuid {
    fn from(id: BuildId) -> Self {
        id.0
    }
}
