use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{Method, Request, ResponseType, Transport};
use crate::error::TransportError;

/// Transport over HTTP(S) using reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("hookfetch/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }

  /// Wrap an already configured reqwest client.
  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }

  /// Turn a resolved request into a reqwest request without sending it.
  fn build(&self, request: &Request) -> Result<reqwest::Request, TransportError> {
    let options = &request.options;
    let url = full_url(options.base_url.as_deref(), &request.url)?;

    let mut builder = self
      .client
      .request(reqwest_method(request.method), url)
      .timeout(options.timeout);

    for (name, value) in &options.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if !options.params.is_empty() {
      builder = builder.query(&options.params);
    }
    if let Some(token) = &options.token {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    Ok(builder.build()?)
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: Request) -> Result<Value, TransportError> {
    let http_request = self.build(&request)?;
    debug!(method = %request.method, url = %http_request.url(), "sending request");

    let response = self
      .client
      .execute(http_request)
      .await?
      .error_for_status()?;
    let body = response.bytes().await?;

    decode_body(&body, request.options.response_type)
  }
}

fn reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

/// Absolute URLs are used as-is; anything else is appended to the base URL.
fn full_url(base_url: Option<&str>, path: &str) -> Result<Url, TransportError> {
  if let Ok(url) = Url::parse(path) {
    if url.has_host() {
      return Ok(url);
    }
  }

  let base_url =
    base_url.ok_or_else(|| TransportError::new(format!("no base URL for relative path {}", path)))?;

  Url::parse(&format!("{}{}", base_url, path))
    .map_err(|e| TransportError::new(format!("invalid URL {}{}: {}", base_url, path, e)))
}

fn decode_body(body: &[u8], response_type: ResponseType) -> Result<Value, TransportError> {
  match response_type {
    ResponseType::Json => {
      if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
      }
      serde_json::from_slice(body)
        .map_err(|e| TransportError::new(format!("invalid JSON response: {}", e)))
    }
    ResponseType::Text => String::from_utf8(body.to_vec())
      .map(Value::String)
      .map_err(|e| TransportError::new(format!("invalid UTF-8 in text response: {}", e))),
  }
}
