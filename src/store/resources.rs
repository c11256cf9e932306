//! Keyed resource storage with structural sharing.
//!
//! Records live behind `Arc`s at every level (`type -> id -> record`), and
//! writes go through `Arc::make_mut`, so a write copies only the path to the
//! record it touches. Snapshots taken before the write keep the old nodes, and
//! untouched records keep their identity across snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::{Invalidating, Resource, ResourceRef};

/// Records of a single type, keyed by id.
pub type ResourceMap = BTreeMap<String, Arc<Resource>>;

/// All stored records, keyed by type then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(Arc<BTreeMap<String, Arc<ResourceMap>>>);

impl Resources {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, target: &ResourceRef) -> bool {
    self.get(&target.resource_type, &target.id).is_some()
  }

  pub fn get(&self, resource_type: &str, id: &str) -> Option<&Arc<Resource>> {
    self.0.get(resource_type).and_then(|by_id| by_id.get(id))
  }

  pub fn get_ref(&self, target: &ResourceRef) -> Option<&Arc<Resource>> {
    self.get(&target.resource_type, &target.id)
  }

  /// Records of one type, if the type has ever been stored.
  pub fn of_type(&self, resource_type: &str) -> Option<&ResourceMap> {
    self.0.get(resource_type).map(Arc::as_ref)
  }

  pub fn types(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  /// Total number of records across all types.
  pub fn len(&self) -> usize {
    self.0.values().map(|by_id| by_id.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Make sure a (possibly empty) bucket exists for `resource_type`.
  pub fn ensure_type(&mut self, resource_type: &str) {
    if !self.0.contains_key(resource_type) {
      Arc::make_mut(&mut self.0).insert(resource_type.to_string(), Arc::default());
    }
  }

  /// Merge `incoming` into the store. Returns whether anything changed.
  ///
  /// Relationships on `incoming` with no `data` member take the stored value
  /// for the same name. If the merged candidate equals the stored record the
  /// store is left untouched, so the existing `Arc` survives.
  pub fn upsert(&mut self, mut incoming: Resource) -> bool {
    if let Some(current) = self.get(&incoming.resource_type, &incoming.id) {
      for (name, relationship) in incoming.relationships.iter_mut() {
        if relationship.data.is_absent() {
          if let Some(stored) = current.relationships.get(name) {
            *relationship = stored.clone();
          }
        }
      }

      if **current == incoming {
        return false;
      }
    }

    let by_id = Arc::make_mut(
      Arc::make_mut(&mut self.0)
        .entry(incoming.resource_type.clone())
        .or_default(),
    );
    by_id.insert(incoming.id.clone(), Arc::new(incoming));
    true
  }

  /// Merge a raw payload entry, dropping anything that is not a resource object.
  pub fn upsert_value(&mut self, candidate: &Value) -> bool {
    match Resource::from_value(candidate) {
      Some(resource) => self.upsert(resource),
      None => false,
    }
  }

  /// Merge a batch in order; a later duplicate wins over an earlier one.
  pub fn upsert_all<I>(&mut self, incoming: I) -> bool
  where
    I: IntoIterator<Item = Resource>,
  {
    incoming
      .into_iter()
      .fold(false, |changed, resource| self.upsert(resource) | changed)
  }

  /// Delete a record outright. The type bucket is kept even when emptied.
  pub fn remove(&mut self, target: &ResourceRef) -> bool {
    if !self.contains(target) {
      return false;
    }

    let outer = Arc::make_mut(&mut self.0);
    match outer.get_mut(&target.resource_type) {
      Some(by_id) => Arc::make_mut(by_id).remove(&target.id).is_some(),
      None => false,
    }
  }

  /// Set or clear the invalidation marker on an existing record.
  ///
  /// Missing records are left alone, and so is a record whose marker already
  /// has the requested value.
  pub fn set_invalidating(&mut self, target: &ResourceRef, marker: Option<Invalidating>) -> bool {
    match self.get_ref(target) {
      Some(current) if current.is_invalidating != marker => {}
      _ => return false,
    }

    let outer = Arc::make_mut(&mut self.0);
    let Some(by_id) = outer.get_mut(&target.resource_type) else {
      return false;
    };
    let Some(record) = Arc::make_mut(by_id).get_mut(&target.id) else {
      return false;
    };
    Arc::make_mut(record).is_invalidating = marker;
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::model::{Linkage, Relationship};
  use serde_json::json;

  fn user() -> Resource {
    Resource::new("users", "1")
      .with_attribute("name", json!("John Doe"))
      .with_relationship(
        "company",
        Relationship::to_one(ResourceRef::new("companies", "9")),
      )
      .with_relationship("groups", Relationship::null())
  }

  fn seeded() -> Resources {
    let mut resources = Resources::new();
    resources.upsert(user());
    resources.upsert(Resource::new("users", "2").with_attribute("name", json!("Jane")));
    resources
  }

  #[test]
  fn inserts_new_records() {
    let resources = seeded();

    assert!(resources.contains(&ResourceRef::new("users", "1")));
    assert!(!resources.contains(&ResourceRef::new("users", "3")));
    assert!(!resources.contains(&ResourceRef::new("companies", "9")));
    assert_eq!(resources.len(), 2);
  }

  #[test]
  fn unchanged_upsert_keeps_identity() {
    let before = seeded();
    let mut after = before.clone();

    assert!(!after.upsert(user()));
    assert!(Arc::ptr_eq(
      before.get("users", "1").unwrap(),
      after.get("users", "1").unwrap()
    ));
    assert!(Arc::ptr_eq(&before.0, &after.0));
  }

  #[test]
  fn changed_upsert_replaces_only_that_record() {
    let before = seeded();
    let mut after = before.clone();

    assert!(after.upsert(user().with_attribute("name", json!("Johnny"))));

    assert!(!Arc::ptr_eq(
      before.get("users", "1").unwrap(),
      after.get("users", "1").unwrap()
    ));
    assert!(Arc::ptr_eq(
      before.get("users", "2").unwrap(),
      after.get("users", "2").unwrap()
    ));
    assert_eq!(before.get("users", "1").unwrap().attributes["name"], json!("John Doe"));
    assert_eq!(after.get("users", "1").unwrap().attributes["name"], json!("Johnny"));
  }

  #[test]
  fn relationship_without_data_keeps_stored_value() {
    let mut resources = seeded();
    let partial = Resource::new("users", "1")
      .with_attribute("name", json!("John Doe"))
      .with_relationship("company", Relationship::default())
      .with_relationship("groups", Relationship::null());

    assert!(!resources.upsert(partial));
    assert_eq!(
      resources.get("users", "1").unwrap().relationships["company"].data,
      Linkage::One(ResourceRef::new("companies", "9"))
    );
  }

  #[test]
  fn relationship_with_null_data_clears() {
    let mut resources = seeded();
    let cleared = user().with_relationship("company", Relationship::null());

    assert!(resources.upsert(cleared));
    assert_eq!(
      resources.get("users", "1").unwrap().relationships["company"].data,
      Linkage::Null
    );
  }

  #[test]
  fn later_duplicates_in_a_batch_win() {
    let mut resources = Resources::new();
    resources.upsert_all([
      Resource::new("tags", "1").with_attribute("label", json!("first")),
      Resource::new("tags", "1").with_attribute("label", json!("second")),
    ]);

    assert_eq!(resources.get("tags", "1").unwrap().attributes["label"], json!("second"));
    assert_eq!(resources.len(), 1);
  }

  #[test]
  fn malformed_values_are_skipped() {
    let mut resources = seeded();
    let before = resources.clone();

    assert!(!resources.upsert_value(&json!(42)));
    assert!(!resources.upsert_value(&json!({ "id": "1" })));
    assert!(Arc::ptr_eq(&before.0, &resources.0));
  }

  #[test]
  fn remove_deletes_outright() {
    let mut resources = seeded();

    assert!(resources.remove(&ResourceRef::new("users", "1")));
    assert!(!resources.remove(&ResourceRef::new("users", "1")));
    assert!(resources.get("users", "1").is_none());
    assert!(resources.of_type("users").is_some());
  }

  #[test]
  fn invalidating_marker_touches_only_the_marker() {
    let before = seeded();
    let mut marked = before.clone();
    let target = ResourceRef::new("users", "1");

    assert!(marked.set_invalidating(&target, Some(Invalidating::IsUpdating)));
    let record = marked.get_ref(&target).unwrap();
    assert_eq!(record.is_invalidating, Some(Invalidating::IsUpdating));
    assert_eq!(record.attributes, before.get_ref(&target).unwrap().attributes);
    assert!(Arc::ptr_eq(
      before.get("users", "2").unwrap(),
      marked.get("users", "2").unwrap()
    ));

    let mut cleared = marked.clone();
    assert!(cleared.set_invalidating(&target, None));
    assert_eq!(cleared.get_ref(&target).unwrap().is_invalidating, None);

    assert!(!cleared.set_invalidating(&ResourceRef::new("users", "404"), None));
    assert!(!cleared.set_invalidating(&target, None));
  }

  #[test]
  fn ensure_type_creates_an_empty_bucket_once() {
    let mut resources = Resources::new();
    resources.ensure_type("tasks");
    let snapshot = resources.clone();
    resources.ensure_type("tasks");

    assert!(resources.of_type("tasks").unwrap().is_empty());
    assert!(Arc::ptr_eq(&snapshot.0, &resources.0));
  }
}
