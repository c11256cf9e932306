//! The normalized store: resources, sort views, request status and the
//! transport configuration, as one cheaply clonable snapshot.
//!
//! Snapshots are immutable values. Every transition produces a new `Store`
//! that shares all untouched nodes with its predecessor; see
//! [`Resources`] for the sharing rules.

mod model;
mod resources;
mod sorts;

pub use model::{Invalidating, Linkage, Relationship, Resource, ResourceRef};
pub use resources::{ResourceMap, Resources};
pub use sorts::{sort_fingerprint, SortView, Sorts};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::EndpointConfig;
use crate::jsonapi::PendingRead;

/// Which in-flight counter an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Create,
  Read,
  Update,
  Delete,
}

/// Number of in-flight requests of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
  pub is_creating: u32,
  pub is_reading: u32,
  pub is_updating: u32,
  pub is_deleting: u32,
}

impl Status {
  pub fn get(&self, operation: Operation) -> u32 {
    match operation {
      Operation::Create => self.is_creating,
      Operation::Read => self.is_reading,
      Operation::Update => self.is_updating,
      Operation::Delete => self.is_deleting,
    }
  }

  fn counter(&mut self, operation: Operation) -> &mut u32 {
    match operation {
      Operation::Create => &mut self.is_creating,
      Operation::Read => &mut self.is_reading,
      Operation::Update => &mut self.is_updating,
      Operation::Delete => &mut self.is_deleting,
    }
  }

  pub fn begin(&mut self, operation: Operation) {
    let counter = self.counter(operation);
    *counter = counter.saturating_add(1);
  }

  /// Counters never go below zero; an unmatched completion is logged and
  /// otherwise ignored.
  pub fn finish(&mut self, operation: Operation) {
    let counter = self.counter(operation);
    match counter.checked_sub(1) {
      Some(next) => *counter = next,
      None => warn!(?operation, "completion without a matching request"),
    }
  }

  /// Whether no request of any kind is in flight.
  pub fn is_idle(&self) -> bool {
    *self == Status::default()
  }
}

/// The `endpoint` slot of the store: configuration handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
  #[serde(default)]
  pub transport_config: EndpointConfig,
}

/// In-flight reads keyed by the exact endpoint string they were issued for.
pub type Pending = BTreeMap<String, PendingRead>;

/// Root snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
  #[serde(default)]
  pub resources: Resources,
  #[serde(default)]
  pub sorts: Sorts,
  #[serde(default)]
  pub status: Status,
  #[serde(skip)]
  pub pending: Pending,
  #[serde(default)]
  pub endpoint: Endpoint,
}

impl Store {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains_resource(&self, target: &ResourceRef) -> bool {
    self.resources.contains(target)
  }

  pub fn resource(&self, resource_type: &str, id: &str) -> Option<&Resource> {
    self.resources.get(resource_type, id).map(AsRef::as_ref)
  }

  pub fn sort(&self, resource_type: &str, fingerprint: &str) -> Option<&SortView> {
    self.sorts.get(resource_type, fingerprint).map(AsRef::as_ref)
  }

  pub fn config(&self) -> &EndpointConfig {
    &self.endpoint.transport_config
  }

  pub fn upsert(&self, resource: Resource) -> Store {
    let mut next = self.clone();
    next.resources.upsert(resource);
    next
  }

  pub fn upsert_all<I>(&self, resources: I) -> Store
  where
    I: IntoIterator<Item = Resource>,
  {
    let mut next = self.clone();
    next.resources.upsert_all(resources);
    next
  }

  pub fn remove(&self, target: &ResourceRef) -> Store {
    let mut next = self.clone();
    next.resources.remove(target);
    next
  }

  pub fn set_invalidating(&self, target: &ResourceRef, marker: Option<Invalidating>) -> Store {
    let mut next = self.clone();
    next.resources.set_invalidating(target, marker);
    next
  }

  /// Prepare a snapshot loaded from storage for a new process: requests that
  /// were in flight when it was saved will never complete here.
  pub fn restored(mut self) -> Store {
    self.status = Status::default();
    self.pending.clear();
    self
  }
}
