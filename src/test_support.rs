//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::cache::{Clock, SqliteStorage};
use crate::client::FetchClient;
use crate::config::ConfigOptions;
use crate::error::TransportError;
use crate::transport::{Request, Transport};

/// Clock that only moves when told to.
pub struct ManualClock {
  millis: AtomicI64,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      millis: AtomicI64::new(0),
    }
  }

  pub fn set_millis(&self, millis: i64) {
    self.millis.store(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap()
  }
}

type Handler = dyn Fn(&Request, usize) -> (Duration, Result<Value, TransportError>) + Send + Sync;

/// Transport whose answers come from a closure of `(request, 1-based call number)`.
pub struct ScriptedTransport {
  calls: AtomicUsize,
  requests: Mutex<Vec<Request>>,
  handler: Box<Handler>,
}

impl ScriptedTransport {
  pub fn new(
    handler: impl Fn(&Request, usize) -> (Duration, Result<Value, TransportError>)
      + Send
      + Sync
      + 'static,
  ) -> Arc<Self> {
    Arc::new(Self {
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new()),
      handler: Box::new(handler),
    })
  }

  /// Always succeeds with `value`.
  pub fn ok(value: Value) -> Arc<Self> {
    Self::new(move |_, _| (Duration::ZERO, Ok(value.clone())))
  }

  /// Always fails with "failure #<call>".
  pub fn failing() -> Arc<Self> {
    Self::new(|_, call| {
      (
        Duration::ZERO,
        Err(TransportError::new(format!("failure #{}", call))),
      )
    })
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: Request) -> Result<Value, TransportError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    self.requests.lock().unwrap().push(request.clone());

    let (delay, result) = (self.handler)(&request, call);
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    result
  }
}

/// Client over a fresh SQLite file, configured with a base URL and token.
pub fn test_client(transport: Arc<ScriptedTransport>) -> (FetchClient, TempDir) {
  let temp_dir = TempDir::new().unwrap();
  let storage = Arc::new(SqliteStorage::open(temp_dir.path().join("cache.db")));
  let config = ConfigOptions {
    base_url: Some("https://api.test".to_string()),
    token: Some("config-token".to_string()),
    ..ConfigOptions::default()
  };
  (FetchClient::new(config, storage, transport), temp_dir)
}
