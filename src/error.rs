//! Error types for the transport, the persistent store, and the hooks.

use thiserror::Error;

/// Failure of the outbound transport.
///
/// Network errors, timeouts, and non-success responses all collapse into this one
/// type. Callers only learn that the request failed and why, in words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request failed: {message}")]
pub struct TransportError {
  message: String,
}

impl TransportError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(err: reqwest::Error) -> Self {
    Self::new(err.to_string())
  }
}

/// Failure of the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  #[error("failed to open cache store: {0}")]
  Open(String),

  #[error("failed to migrate cache store: {0}")]
  Migrate(String),

  #[error("failed to read cache entry: {0}")]
  Read(String),

  #[error("failed to write cache entry: {0}")]
  Write(String),

  #[error("failed to delete cache entry: {0}")]
  Delete(String),

  /// A stored row exists but cannot be decoded.
  #[error("corrupt cache entry: {0}")]
  Corrupt(String),

  #[error("cache store lock poisoned: {0}")]
  Lock(String),
}

/// Anything that can end a fetch or mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error(transparent)]
  Store(#[from] StoreError),

  /// Body could not be encoded, or the payload does not match the requested type.
  #[error("serialization error: {0}")]
  Serialization(String),
}

impl FetchError {
  pub fn serialization(err: serde_json::Error) -> Self {
    Self::Serialization(err.to_string())
  }
}
