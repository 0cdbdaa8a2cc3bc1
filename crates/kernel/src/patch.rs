//! A field value in a partial update: either left out of the request or set.

use serde::{Deserialize, Deserializer};

/// Distinguishes a key missing from a request body from a key that was sent,
/// including one sent with an empty or zero value.
///
/// Use with `#[serde(default)]` so absent keys deserialize to [`Patch::Missing`].
/// For nullable fields use `Patch<Option<T>>`; an explicit `null` then becomes
/// `Patch::Set(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Missing,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Overwrites `target` when a value was provided.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}
