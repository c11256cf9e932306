//! Dispatching client: runs requests through a [`Transport`] and feeds the
//! resulting lifecycle events to the reducer.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::api_types::{pagination_endpoint, Document};
use super::planner;
use super::transport::{Request, Transport};
use crate::config::EndpointConfig;
use crate::error::SharedError;
use crate::lookup;
use crate::reducer::{reduce, Event};
use crate::store::{Resource, ResourceRef, Store};

/// Outcome of a read, shared by every caller of the same endpoint.
pub type ReadResult = Result<ReadResponse, SharedError>;

/// Handle on an in-flight read. Cloning it does not issue another request;
/// every clone resolves to the same result.
#[derive(Clone)]
pub struct PendingRead(Shared<BoxFuture<'static, ReadResult>>);

impl PendingRead {
  pub fn new(request: BoxFuture<'static, ReadResult>) -> Self {
    Self(request.shared())
  }

  /// A handle that is already resolved.
  pub fn ready(result: ReadResult) -> Self {
    Self::new(future::ready(result).boxed())
  }

  pub fn is_resolved(&self) -> bool {
    self.0.peek().is_some()
  }
}

impl fmt::Debug for PendingRead {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingRead")
      .field("resolved", &self.is_resolved())
      .finish()
  }
}

impl std::future::Future for PendingRead {
  type Output = ReadResult;

  fn poll(
    mut self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Self::Output> {
    self.0.poll_unpin(cx)
  }
}

/// A successful read, with the endpoints of the neighbouring pages.
#[derive(Debug, Clone)]
pub struct ReadResponse {
  pub endpoint: String,
  pub body: Document,
  pub next: Option<String>,
  pub prev: Option<String>,
}

struct Inner<T> {
  transport: T,
  state: Mutex<Store>,
}

/// Owns the current store snapshot and issues requests against it.
///
/// Cloning is cheap; clones share the same store.
pub struct Client<T: Transport> {
  inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Client<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Transport> Client<T> {
  pub fn new(transport: T) -> Self {
    Self::with_store(transport, Store::default())
  }

  /// Start from an existing snapshot, e.g. one restored from storage.
  pub fn with_store(transport: T, store: Store) -> Self {
    Self {
      inner: Arc::new(Inner {
        transport,
        state: Mutex::new(store),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Store> {
    // Snapshots are swapped in whole, so a poisoned lock still holds a
    // consistent store.
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// The current snapshot.
  pub fn state(&self) -> Store {
    self.lock().clone()
  }

  /// Apply one event and return the resulting snapshot.
  pub fn dispatch(&self, event: Event) -> Store {
    let mut state = self.lock();
    *state = reduce(&state, event);
    state.clone()
  }

  pub fn set_config(&self, config: EndpointConfig) -> Store {
    self.dispatch(Event::SetConfig(config))
  }

  pub fn hydrate(&self, document: Document) -> Store {
    self.dispatch(Event::Hydrate(document))
  }

  fn config(&self) -> EndpointConfig {
    self.lock().endpoint.transport_config.clone()
  }

  /// POST `resource` to its type's collection.
  ///
  /// `resource` is a raw resource object since new resources usually have no
  /// id yet.
  pub async fn create_resource(&self, resource: Value) -> Result<Option<Document>, SharedError> {
    self.dispatch(Event::WillCreate(resource.clone()));

    let endpoint = lookup::get_str(&resource, &["type"])
      .unwrap_or_default()
      .to_string();
    let request = Request::post(endpoint, json!({ "data": resource }));

    match self.inner.transport.send(request, &self.config()).await {
      Ok(document) => {
        self.dispatch(Event::Created(document.clone().unwrap_or_default()));
        Ok(document)
      }
      Err(e) => {
        warn!(error = %e, "create failed");
        let error = Arc::new(e);
        self.dispatch(Event::CreateFailed {
          resource,
          error: Arc::clone(&error),
        });
        Err(error)
      }
    }
  }

  /// GET `endpoint`, merging the response into the store.
  ///
  /// While a read of the exact same endpoint string is in flight, the
  /// existing handle is returned instead of issuing another request. The
  /// request is driven on the tokio runtime whether or not the handle is
  /// awaited.
  pub fn read_endpoint(&self, endpoint: &str) -> PendingRead {
    let mut state = self.lock();
    if let Some(pending) = state.pending.get(endpoint) {
      debug!(endpoint, "joining in-flight read");
      return pending.clone();
    }

    let client = self.clone();
    let owned = endpoint.to_string();
    let handle = PendingRead::new(async move { client.perform_read(owned).await }.boxed());

    *state = reduce(
      &state,
      Event::WillRead {
        endpoint: endpoint.to_string(),
        request: handle.clone(),
      },
    );
    drop(state);

    tokio::spawn(handle.clone());
    handle
  }

  async fn perform_read(self, endpoint: String) -> ReadResult {
    let config = self.config();

    match self
      .inner
      .transport
      .send(Request::get(endpoint.clone()), &config)
      .await
    {
      Ok(document) => {
        let body = document.unwrap_or_default();
        self.dispatch(Event::Read {
          endpoint: endpoint.clone(),
          document: body.clone(),
        });

        let base_url = config.base_url.as_deref();
        Ok(ReadResponse {
          next: pagination_endpoint(&body, "next", base_url),
          prev: pagination_endpoint(&body, "prev", base_url),
          endpoint,
          body,
        })
      }
      Err(e) => {
        warn!(endpoint = %endpoint, error = %e, "read failed");
        let error = Arc::new(e);
        self.dispatch(Event::ReadFailed {
          endpoint,
          error: Arc::clone(&error),
        });
        Err(error)
      }
    }
  }

  /// Read the page after `response`, if there is one.
  pub fn load_next(&self, response: &ReadResponse) -> Option<PendingRead> {
    response.next.as_deref().map(|next| self.read_endpoint(next))
  }

  /// Read the page before `response`, if there is one.
  pub fn load_prev(&self, response: &ReadResponse) -> Option<PendingRead> {
    response.prev.as_deref().map(|prev| self.read_endpoint(prev))
  }

  /// PATCH `resource` at `type/id`.
  pub async fn update_resource(&self, resource: Resource) -> Result<Option<Document>, SharedError> {
    let target = resource.identity();
    self.dispatch(Event::WillUpdate(target.clone()));

    let mut payload = resource;
    payload.is_invalidating = None;
    let request = Request::patch(target.endpoint(), json!({ "data": payload }));

    match self.inner.transport.send(request, &self.config()).await {
      Ok(document) => {
        self.dispatch(Event::Updated {
          resource: target,
          document: document.clone(),
        });
        Ok(document)
      }
      Err(e) => {
        warn!(resource = %target, error = %e, "update failed");
        let error = Arc::new(e);
        self.dispatch(Event::UpdateFailed {
          resource: target,
          error: Arc::clone(&error),
        });
        Err(error)
      }
    }
  }

  /// DELETE `type/id`.
  pub async fn delete_resource(&self, target: ResourceRef) -> Result<(), SharedError> {
    self.dispatch(Event::WillDelete(target.clone()));

    let request = Request::delete(target.endpoint());
    match self.inner.transport.send(request, &self.config()).await {
      Ok(_) => {
        self.dispatch(Event::Deleted(target));
        Ok(())
      }
      Err(e) => {
        warn!(resource = %target, error = %e, "delete failed");
        let error = Arc::new(e);
        self.dispatch(Event::DeleteFailed {
          resource: target,
          error: Arc::clone(&error),
        });
        Err(error)
      }
    }
  }

  /// Make sure `type/id` and the resources behind the `include`d
  /// relationships are in the store, with as few requests as possible.
  ///
  /// Resolves once every issued read has; fails with the first error.
  pub async fn ensure_resource(
    &self,
    resource_type: &str,
    id: &str,
    include: &[&str],
  ) -> Result<Vec<ReadResponse>, SharedError> {
    let endpoints = planner::plan(&self.state(), resource_type, id, include);
    info!(resource_type, id, reads = endpoints.len(), "ensuring resource");

    let reads: Vec<_> = endpoints
      .iter()
      .map(|endpoint| self.read_endpoint(endpoint))
      .collect();
    future::try_join_all(reads).await
  }

  /// Read `endpoint` (defaulting to the type's collection) unless the store
  /// already holds resources of `resource_type`.
  pub async fn require_resource(
    &self,
    resource_type: &str,
    endpoint: Option<&str>,
  ) -> Result<Option<ReadResponse>, SharedError> {
    let present = self
      .state()
      .resources
      .of_type(resource_type)
      .is_some_and(|by_id| !by_id.is_empty());
    if present {
      return Ok(None);
    }

    self
      .read_endpoint(endpoint.unwrap_or(resource_type))
      .await
      .map(Some)
  }
}
