//! Outbound transport contract and its HTTP implementation.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::ResolvedOptions;
use crate::error::TransportError;

pub use http::HttpTransport;

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  #[default]
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

/// The write methods a mutation may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationMethod {
  #[default]
  Post,
  Put,
  Patch,
  Delete,
}

impl From<MutationMethod> for Method {
  fn from(method: MutationMethod) -> Self {
    match method {
      MutationMethod::Post => Method::Post,
      MutationMethod::Put => Method::Put,
      MutationMethod::Patch => Method::Patch,
      MutationMethod::Delete => Method::Delete,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    };
    f.write_str(name)
  }
}

/// How the response body should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Parse the body as JSON (empty body is `null`)
  #[default]
  Json,
  /// Return the body as a JSON string
  Text,
}

/// A fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  /// Path or absolute URL; also the cache key for GET requests
  pub url: String,
  pub options: ResolvedOptions,
  pub body: Option<Value>,
}

impl Request {
  pub fn get(url: impl Into<String>, options: ResolvedOptions) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      options,
      body: None,
    }
  }

  pub fn with_body(
    method: impl Into<Method>,
    url: impl Into<String>,
    options: ResolvedOptions,
    body: Value,
  ) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
      options,
      body: Some(body),
    }
  }
}

/// "Fetch a URL with options, return the parsed body or fail."
///
/// Implementations apply the resolved headers, bearer token, query params and
/// timeout, and report every failure (network, timeout, non-2xx) as a
/// [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: Request) -> Result<Value, TransportError>;
}
