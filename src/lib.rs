//! A normalized client-side cache for JSON:API backends.
//!
//! Responses are merged into a [`Store`] keyed by resource type and id by a
//! pure reducer ([`reducer::reduce`]). Unchanged records keep their identity
//! across snapshots, relationships sent without linkage keep their stored
//! value, and sorted or filtered listings are tracked as ordered id views that
//! are rebuilt when the collection changes size underneath them.
//!
//! [`Client`] wires the reducer to a [`Transport`] and de-duplicates
//! concurrent reads of the same endpoint.

pub mod cache;
pub mod config;
pub mod error;
pub mod jsonapi;
pub mod logging;
pub mod lookup;
pub mod reducer;
pub mod store;

pub use config::{Config, EndpointConfig};
pub use error::{SharedError, TransportError};
pub use jsonapi::{Client, Document, HttpTransport, PendingRead, ReadResponse, Transport};
pub use reducer::{reduce, Event};
pub use store::{
  Invalidating, Linkage, Relationship, Resource, ResourceRef, SortView, Status, Store,
};
