//! Canonical identifiers.
//!
//! The backend spells identifiers several ways: `id` or `_id` on records,
//! plain strings or numbers, and user references that are either a bare id or
//! an embedded user object. Everything is resolved here, once, at ingestion.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Canonical scalar identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve a scalar JSON value into an id. Empty strings are not ids.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| Self(s.to_string()))
            }
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        EntityId::from_scalar(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid identifier: {}", value)))
    }
}

/// Pick the record id out of an object carrying `id`, `_id`, or both.
///
/// `id` wins when both are present.
pub fn record_ids(obj: &serde_json::Map<String, Value>) -> (Option<EntityId>, Option<EntityId>) {
    let id = obj.get("id").and_then(EntityId::from_scalar);
    let mongo_id = obj.get("_id").and_then(EntityId::from_scalar);
    match (id, mongo_id) {
        (Some(id), Some(alt)) if id != alt => (Some(id), Some(alt)),
        (Some(id), _) => (Some(id), None),
        (None, Some(alt)) => (Some(alt), None),
        (None, None) => (None, None),
    }
}

/// Reference to a user in any of the three wire shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: EntityId,
    /// Second id carried by objects that send both `id` and `_id`.
    pub alt_id: Option<EntityId>,
    pub name: Option<String>,
}

impl UserRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(id) = EntityId::from_scalar(value) {
            return Some(Self {
                id,
                alt_id: None,
                name: None,
            });
        }
        let obj = value.as_object()?;
        let (id, alt_id) = record_ids(obj);
        let name = ["name", "fullName", "username"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        Some(Self { id: id?, alt_id, name })
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        std::iter::once(&self.id).chain(self.alt_id.iter())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

impl Serialize for UserRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UserRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        UserRef::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid user reference: {}", value)))
    }
}

/// The logged-in user, as known to the session provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<EntityId>,
    #[serde(rename = "_id", default)]
    pub alt_id: Option<EntityId>,
}

impl SessionUser {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: Some(id.into()),
            alt_id: None,
        }
    }

    pub fn with_alt_id(mut self, alt_id: impl Into<EntityId>) -> Self {
        self.alt_id = Some(alt_id.into());
        self
    }

    pub fn is_known(&self) -> bool {
        self.id.is_some() || self.alt_id.is_some()
    }

    /// Compare a user reference against both session ids.
    pub fn matches(&self, user: &UserRef) -> bool {
        user.ids().any(|candidate| {
            self.id.as_ref() == Some(candidate) || self.alt_id.as_ref() == Some(candidate)
        })
    }
}
