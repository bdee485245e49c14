//! Explicit present/absent marker for partial updates.

use serde::{Deserialize, Deserializer};

/// A single field of a partial-update payload.
///
/// A field missing from the request body is [`Patch::Absent`] and leaves the
/// stored value untouched. For nullable columns use `Patch<Option<T>>`: an
/// explicit JSON `null` becomes `Patch::Set(None)` and clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Absent,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Absent => None,
        }
    }

    /// Overwrites `target` when the field was supplied
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(v) = self {
            *target = v;
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Absent,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}
