//! JSON:API client side: document types, the transport boundary, the
//! dispatching client and the selective-fetch planner.

pub mod api_types;
pub mod client;
pub mod planner;
pub mod transport;

pub use api_types::{Document, JSONAPI_MEDIA_TYPE};
pub use client::{Client, PendingRead, ReadResponse, ReadResult};
pub use transport::{HttpTransport, Request, Transport};
