//! Data models shared by the engine, directory, and serving layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible student identifier.
///
/// Identifiers are 1-based: identifier `n` names row `n - 1` of the embedding
/// store. [`UserId::to_index`] and [`UserId::from_index`] are the only places
/// that conversion happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Resolve this identifier to a row index in a store of `len` rows.
    ///
    /// Returns `None` for identifiers outside `1..=len`.
    #[must_use]
    pub fn to_index(self, len: usize) -> Option<usize> {
        let index = usize::try_from(self.0.checked_sub(1)?).ok()?;
        (index < len).then_some(index)
    }

    /// The identifier for row `index`.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(i64::try_from(index).map_or(i64::MAX, |i| i.saturating_add(1)))
    }

    /// Raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A recommended student with the similarity score that ranked them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recommendation {
    pub user: UserId,
    /// Cosine similarity to the querying student, in `[-1.0, 1.0]`.
    pub score: f32,
}

/// One row of the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub uid: UserId,
    pub info: String,
}
