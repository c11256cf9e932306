//! Errors surfaced by the transport.
//!
//! The reducer itself never fails; every error here originates at the
//! network boundary and names the endpoint being requested so the matching
//! failure event can be routed.

use std::sync::Arc;
use thiserror::Error;

/// Transport errors are shared between every caller waiting on the same
/// in-flight read, so they travel behind an `Arc`.
pub type SharedError = Arc<TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
  /// The endpoint could not be resolved against the configured base URL.
  #[error("invalid endpoint {endpoint}: {source}")]
  InvalidUrl {
    endpoint: String,
    #[source]
    source: url::ParseError,
  },

  /// Connection, timeout or protocol failure.
  #[error("request to {endpoint} failed: {source}")]
  Network {
    endpoint: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-2xx status.
  #[error("request to {endpoint} returned status {status}")]
  Status { endpoint: String, status: u16 },

  /// The response was not JSON.
  #[error("invalid Content-Type {content_type:?} in response from {endpoint}")]
  ContentType {
    endpoint: String,
    content_type: Option<String>,
  },

  /// The body was JSON but not a JSON:API document.
  #[error("invalid document from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    #[source]
    source: serde_json::Error,
  },
}

impl TransportError {
  /// The endpoint the failed request was issued for.
  pub fn endpoint(&self) -> &str {
    match self {
      TransportError::InvalidUrl { endpoint, .. }
      | TransportError::Network { endpoint, .. }
      | TransportError::Status { endpoint, .. }
      | TransportError::ContentType { endpoint, .. }
      | TransportError::Decode { endpoint, .. } => endpoint,
    }
  }

  /// HTTP status, when the server answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      TransportError::Status { status, .. } => Some(*status),
      TransportError::Network { source, .. } => source.status().map(|s| s.as_u16()),
      _ => None,
    }
  }
}
