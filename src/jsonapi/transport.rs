//! The network boundary: a [`Transport`] turns a request into a document.

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::api_types::{Document, JSONAPI_MEDIA_TYPE};
use crate::config::EndpointConfig;
use crate::error::TransportError;

/// A request for one endpoint.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  /// Endpoint relative to the configured base URL, or an absolute URL
  pub endpoint: String,
  /// JSON body, serialized as-is
  pub body: Option<Value>,
}

impl Request {
  pub fn get(endpoint: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      endpoint: endpoint.into(),
      body: None,
    }
  }

  pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::POST,
      endpoint: endpoint.into(),
      body: Some(body),
    }
  }

  pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::PATCH,
      endpoint: endpoint.into(),
      body: Some(body),
    }
  }

  pub fn delete(endpoint: impl Into<String>) -> Self {
    Self {
      method: Method::DELETE,
      endpoint: endpoint.into(),
      body: None,
    }
  }
}

/// Something that can execute requests.
///
/// Implementations resolve to `Ok(None)` for successful responses without a
/// body (204), and must report non-2xx statuses and non-JSON responses as
/// errors.
pub trait Transport: Send + Sync + 'static {
  fn send(
    &self,
    request: Request,
    config: &EndpointConfig,
  ) -> BoxFuture<'static, Result<Option<Document>, TransportError>>;
}

/// Headers for a request: the configured ones, with `Accept` and
/// `Content-Type` forced to the JSON:API media type whatever the caller set.
pub fn request_headers(config: &EndpointConfig) -> HeaderMap {
  let mut headers = HeaderMap::new();
  for (name, value) in &config.headers {
    match (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(value),
    ) {
      (Ok(name), Ok(value)) => {
        headers.insert(name, value);
      }
      _ => warn!(header = %name, "skipping invalid configured header"),
    }
  }

  let media_type = HeaderValue::from_static(JSONAPI_MEDIA_TYPE);
  headers.insert(ACCEPT, media_type.clone());
  headers.insert(CONTENT_TYPE, media_type);
  headers
}

/// Resolve `endpoint` against the configured base URL. Absolute URLs are used
/// unchanged.
pub fn resolve_url(config: &EndpointConfig, endpoint: &str) -> Result<Url, TransportError> {
  let invalid = |source| TransportError::InvalidUrl {
    endpoint: endpoint.to_string(),
    source,
  };

  match Url::parse(endpoint) {
    Ok(url) => Ok(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => {
      let base = config
        .base_url
        .as_deref()
        .ok_or(url::ParseError::RelativeUrlWithoutBase)
        .map_err(invalid)?;
      // Without the trailing slash `join` would replace the last segment.
      let base = Url::parse(&format!("{}/", base.trim_end_matches('/'))).map_err(invalid)?;
      base.join(endpoint.trim_start_matches('/')).map_err(invalid)
    }
    Err(e) => Err(invalid(e)),
  }
}

/// HTTP transport built on reqwest.
#[derive(Clone, Default)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

impl Transport for HttpTransport {
  fn send(
    &self,
    request: Request,
    config: &EndpointConfig,
  ) -> BoxFuture<'static, Result<Option<Document>, TransportError>> {
    let client = self.client.clone();
    let headers = request_headers(config);
    let url = resolve_url(config, &request.endpoint);
    let timeout = config.timeout_secs.map(Duration::from_secs);

    match url {
      Ok(url) => execute(client, request, url, headers, timeout).boxed(),
      Err(e) => future::ready(Err(e)).boxed(),
    }
  }
}

async fn execute(
  client: reqwest::Client,
  request: Request,
  url: Url,
  headers: HeaderMap,
  timeout: Option<Duration>,
) -> Result<Option<Document>, TransportError> {
  let Request {
    method,
    endpoint,
    body,
  } = request;

  debug!(%method, %url, "sending request");

  let mut builder = client.request(method, url).headers(headers);
  if let Some(timeout) = timeout {
    builder = builder.timeout(timeout);
  }
  if let Some(body) = &body {
    let bytes = serde_json::to_vec(body).map_err(|source| TransportError::Decode {
      endpoint: endpoint.clone(),
      source,
    })?;
    builder = builder.body(bytes);
  }

  let response = builder
    .send()
    .await
    .map_err(|source| TransportError::Network {
      endpoint: endpoint.clone(),
      source,
    })?;
  let status = response.status();

  if !status.is_success() {
    return Err(TransportError::Status {
      endpoint,
      status: status.as_u16(),
    });
  }
  if status == StatusCode::NO_CONTENT {
    return Ok(None);
  }

  let content_type = response
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from);
  if !content_type
    .as_deref()
    .is_some_and(Document::is_json_content_type)
  {
    return Err(TransportError::ContentType {
      endpoint,
      content_type,
    });
  }

  let bytes = response
    .bytes()
    .await
    .map_err(|source| TransportError::Network {
      endpoint: endpoint.clone(),
      source,
    })?;
  let document =
    serde_json::from_slice(&bytes).map_err(|source| TransportError::Decode { endpoint, source })?;

  Ok(Some(document))
}
