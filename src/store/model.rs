//! Resource records as held by the store.
//!
//! These mirror JSON:API resource objects closely enough to round-trip through
//! serde, while making the one distinction the merge logic depends on explicit:
//! a relationship whose `data` member is missing versus one whose `data` is
//! `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Identity of a resource: its `(type, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
  #[serde(rename = "type")]
  pub resource_type: String,
  pub id: String,
}

impl ResourceRef {
  pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      resource_type: resource_type.into(),
      id: id.into(),
    }
  }

  /// The canonical endpoint for this resource, `type/id`.
  pub fn endpoint(&self) -> String {
    format!("{}/{}", self.resource_type, self.id)
  }
}

impl fmt::Display for ResourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.resource_type, self.id)
  }
}

/// Advisory marker set while a mutating request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Invalidating {
  IsUpdating,
  IsDeleting,
}

/// Resource linkage carried by a relationship's `data` member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Linkage {
  /// No `data` member: the payload carried only links or meta.
  #[default]
  Absent,
  /// `data: null`, an explicitly empty to-one relationship.
  Null,
  /// To-one relationship.
  One(ResourceRef),
  /// To-many relationship (possibly empty).
  Many(Vec<ResourceRef>),
}

impl Linkage {
  pub fn is_absent(&self) -> bool {
    matches!(self, Linkage::Absent)
  }

  /// Referenced identities, in payload order.
  pub fn refs(&self) -> &[ResourceRef] {
    match self {
      Linkage::One(target) => std::slice::from_ref(target),
      Linkage::Many(targets) => targets,
      Linkage::Absent | Linkage::Null => &[],
    }
  }
}

impl Serialize for Linkage {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Linkage::Absent | Linkage::Null => serializer.serialize_none(),
      Linkage::One(target) => target.serialize(serializer),
      Linkage::Many(targets) => targets.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for Linkage {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Present {
      One(ResourceRef),
      Many(Vec<ResourceRef>),
    }

    // Only reached when the member exists; a missing member falls back to
    // `Default`, which is `Absent`.
    Ok(match Option::<Present>::deserialize(deserializer)? {
      None => Linkage::Null,
      Some(Present::One(target)) => Linkage::One(target),
      Some(Present::Many(targets)) => Linkage::Many(targets),
    })
  }
}

/// A named relationship on a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  #[serde(default, skip_serializing_if = "Linkage::is_absent")]
  pub data: Linkage,
  /// `links`, `meta` and anything else the server attached.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Relationship {
  pub fn to_one(target: ResourceRef) -> Self {
    Self {
      data: Linkage::One(target),
      ..Default::default()
    }
  }

  pub fn to_many(targets: Vec<ResourceRef>) -> Self {
    Self {
      data: Linkage::Many(targets),
      ..Default::default()
    }
  }

  pub fn null() -> Self {
    Self {
      data: Linkage::Null,
      ..Default::default()
    }
  }
}

/// A stored resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
  #[serde(rename = "type")]
  pub resource_type: String,
  pub id: String,
  #[serde(default)]
  pub attributes: Map<String, Value>,
  #[serde(default)]
  pub relationships: BTreeMap<String, Relationship>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_invalidating: Option<Invalidating>,
  /// Resource-level `links` and `meta`.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Resource {
  pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      resource_type: resource_type.into(),
      id: id.into(),
      attributes: Map::new(),
      relationships: BTreeMap::new(),
      is_invalidating: None,
      extra: Map::new(),
    }
  }

  pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
    self.attributes.insert(name.into(), value);
    self
  }

  pub fn with_relationship(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
    self.relationships.insert(name.into(), relationship);
    self
  }

  pub fn identity(&self) -> ResourceRef {
    ResourceRef::new(self.resource_type.clone(), self.id.clone())
  }

  /// Parse a candidate from a payload.
  ///
  /// Anything that is not a resource object (non-objects, objects without a
  /// string `type` and `id`) yields `None`; callers drop such candidates.
  pub fn from_value(candidate: &Value) -> Option<Self> {
    if !candidate.is_object() {
      debug!(kind = value_kind(candidate), "ignoring non-object resource candidate");
      return None;
    }

    match Resource::deserialize(candidate) {
      Ok(resource) => Some(resource),
      Err(e) => {
        debug!(error = %e, "ignoring malformed resource candidate");
        None
      }
    }
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
