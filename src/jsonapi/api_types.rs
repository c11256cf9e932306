//! Serde types for JSON:API documents.
//!
//! Only the top level is typed. Primary data, included resources, links and
//! meta stay as raw JSON and are interpreted by the store, which tolerates
//! whatever shape the server sends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::slice;

use crate::lookup;

/// Media type every request and response is expected to use.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Response content types accepted as JSON.
pub const JSON_CONTENT_TYPES: &[&str] = &["application/json", JSONAPI_MEDIA_TYPE];

/// A top-level JSON:API document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
  /// A resource object, an array of them, or `null`.
  #[serde(default)]
  pub data: Value,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub included: Vec<Value>,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub links: Value,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub meta: Value,
  /// `errors`, `jsonapi` and other top-level members.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Document {
  /// Document whose primary data is `data`.
  pub fn with_data(data: Value) -> Self {
    Self {
      data,
      ..Default::default()
    }
  }

  pub fn with_included(mut self, included: Vec<Value>) -> Self {
    self.included = included;
    self
  }

  /// Primary data as a sequence: arrays as-is, a single object as one entry,
  /// `null` as nothing.
  pub fn primary(&self) -> &[Value] {
    match &self.data {
      Value::Array(items) => items,
      Value::Null => &[],
      single => slice::from_ref(single),
    }
  }

  /// Primary data followed by side-loaded resources.
  pub fn entities(&self) -> impl Iterator<Item = &Value> {
    self.primary().iter().chain(self.included.iter())
  }

  /// A link by name, either a plain URL string or a link object's `href`.
  pub fn link(&self, name: &str) -> Option<&str> {
    lookup::get_str(&self.links, &[name]).or_else(|| lookup::get_str(&self.links, &[name, "href"]))
  }

  pub fn self_link(&self) -> Option<&str> {
    self.link("self")
  }

  /// Whether the content type of a response names one of the accepted JSON
  /// media types (parameters such as `charset` are allowed).
  pub fn is_json_content_type(content_type: &str) -> bool {
    JSON_CONTENT_TYPES
      .iter()
      .any(|accepted| content_type.contains(accepted))
  }
}

/// Turn a pagination link into an endpoint relative to `base_url`.
///
/// Links under the configured base are stripped back to the path the client
/// would have requested; anything else is returned as a full URL.
pub fn pagination_endpoint(document: &Document, direction: &str, base_url: Option<&str>) -> Option<String> {
  let link = document.link(direction)?;
  let relative = base_url
    .map(|base| format!("{}/", base.trim_end_matches('/')))
    .and_then(|prefix| link.strip_prefix(prefix.as_str()).map(String::from));

  Some(relative.unwrap_or_else(|| link.to_string()))
}
