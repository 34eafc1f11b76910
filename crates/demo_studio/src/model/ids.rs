use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique run identifier.
///
/// Rendered as the 32-character simple UUID form, which satisfies the
/// artifact contract (URL-safe token of at least 12 characters).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
