//! Lifecycle events and the pure transition function over [`Store`].
//!
//! Every request the client issues is bracketed by events: a `Will*` event
//! when it starts and exactly one success or failure event when it resolves.
//! [`reduce`] folds one event into a snapshot and never fails.

use serde_json::Value;
use tracing::trace;

use crate::config::EndpointConfig;
use crate::error::SharedError;
use crate::jsonapi::{Document, PendingRead};
use crate::lookup;
use crate::store::{Invalidating, Operation, ResourceRef, Resources, Store};

#[derive(Debug)]
pub enum Event {
  /// Replace the transport configuration.
  SetConfig(EndpointConfig),
  /// Seed the store with a document obtained out of band.
  Hydrate(Document),

  /// A create request for this candidate is about to be sent.
  WillCreate(Value),
  Created(Document),
  CreateFailed {
    resource: Value,
    error: SharedError,
  },

  /// A read of `endpoint` has started; `request` resolves when it completes.
  WillRead {
    endpoint: String,
    request: PendingRead,
  },
  Read {
    endpoint: String,
    document: Document,
  },
  ReadFailed {
    endpoint: String,
    error: SharedError,
  },

  WillUpdate(ResourceRef),
  /// `document` is `None` when the server acknowledged without a body.
  Updated {
    resource: ResourceRef,
    document: Option<Document>,
  },
  UpdateFailed {
    resource: ResourceRef,
    error: SharedError,
  },

  WillDelete(ResourceRef),
  Deleted(ResourceRef),
  DeleteFailed {
    resource: ResourceRef,
    error: SharedError,
  },
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::SetConfig(_) => "SET_CONFIG",
      Event::Hydrate(_) => "HYDRATE",
      Event::WillCreate(_) => "WILL_CREATE",
      Event::Created(_) => "CREATED",
      Event::CreateFailed { .. } => "CREATE_FAILED",
      Event::WillRead { .. } => "WILL_READ",
      Event::Read { .. } => "READ",
      Event::ReadFailed { .. } => "READ_FAILED",
      Event::WillUpdate(_) => "WILL_UPDATE",
      Event::Updated { .. } => "UPDATED",
      Event::UpdateFailed { .. } => "UPDATE_FAILED",
      Event::WillDelete(_) => "WILL_DELETE",
      Event::Deleted(_) => "DELETED",
      Event::DeleteFailed { .. } => "DELETE_FAILED",
    }
  }
}

/// Apply `event` to `state`, producing the next snapshot.
///
/// `state` itself is never modified; the result shares every node the event
/// did not touch.
pub fn reduce(state: &Store, event: Event) -> Store {
  trace!(event = event.name(), "reducing");

  let mut next = state.clone();
  match event {
    Event::SetConfig(config) => {
      next.endpoint.transport_config = config;
    }
    Event::Hydrate(document) => {
      merge_document(&mut next.resources, &document);
    }

    Event::WillCreate(_) => next.status.begin(Operation::Create),
    Event::Created(document) => {
      merge_document(&mut next.resources, &document);
      next.status.finish(Operation::Create);
    }
    Event::CreateFailed { resource, .. } => {
      // Candidates without an id were never stored.
      if let Some(target) = identity_of(&resource) {
        next.resources.set_invalidating(&target, None);
      }
      next.status.finish(Operation::Create);
    }

    Event::WillRead { endpoint, request } => {
      next.status.begin(Operation::Read);
      next.pending.insert(endpoint, request);
    }
    Event::Read { endpoint, document } => {
      merge_document(&mut next.resources, &document);
      next.sorts.reconcile(&document);
      next.status.finish(Operation::Read);
      next.pending.remove(&endpoint);
    }
    Event::ReadFailed { endpoint, .. } => {
      next.status.finish(Operation::Read);
      next.pending.remove(&endpoint);
    }

    Event::WillUpdate(target) => {
      next.resources.ensure_type(&target.resource_type);
      next
        .resources
        .set_invalidating(&target, Some(Invalidating::IsUpdating));
      next.status.begin(Operation::Update);
    }
    Event::Updated { resource, document } => {
      if let Some(document) = &document {
        merge_document(&mut next.resources, document);
      }
      next.resources.set_invalidating(&resource, None);
      next.status.finish(Operation::Update);
    }
    Event::UpdateFailed { resource, .. } => {
      next.resources.set_invalidating(&resource, None);
      next.status.finish(Operation::Update);
    }

    Event::WillDelete(target) => {
      next
        .resources
        .set_invalidating(&target, Some(Invalidating::IsDeleting));
      next.status.begin(Operation::Delete);
    }
    Event::Deleted(target) => {
      next.resources.remove(&target);
      next.status.finish(Operation::Delete);
    }
    Event::DeleteFailed { resource, .. } => {
      next.resources.set_invalidating(&resource, None);
      next.status.finish(Operation::Delete);
    }
  }
  next
}

/// Upsert a document's primary data, then its included resources.
fn merge_document(resources: &mut Resources, document: &Document) {
  for candidate in document.entities() {
    resources.upsert_value(candidate);
  }
}

fn identity_of(candidate: &Value) -> Option<ResourceRef> {
  let resource_type = lookup::get_str(candidate, &["type"])?;
  let id = lookup::get_str(candidate, &["id"])?;
  Some(ResourceRef::new(resource_type, id))
}

/// Convenience for feeding a batch of events in order.
pub fn reduce_all<I>(state: &Store, events: I) -> Store
where
  I: IntoIterator<Item = Event>,
{
  events
    .into_iter()
    .fold(state.clone(), |current, event| reduce(&current, event))
}
