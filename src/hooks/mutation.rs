//! One-shot write requests (POST/PUT/PATCH/DELETE) with observable state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::callbacks::Callbacks;
use super::machine::Phase;
use crate::client::FetchClient;
use crate::config::RequestOptions;
use crate::error::FetchError;
use crate::transport::MutationMethod;

/// Per-call options for a [`MutationHook`].
#[derive(Debug)]
pub struct MutateOptions<T> {
  pub request: RequestOptions,
  pub callbacks: Callbacks<T>,
}

impl<T> Default for MutateOptions<T> {
  fn default() -> Self {
    Self {
      request: RequestOptions::default(),
      callbacks: Callbacks::default(),
    }
  }
}

impl<T> MutateOptions<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request(mut self, request: RequestOptions) -> Self {
    self.request = request;
    self
  }

  pub fn callbacks(mut self, callbacks: Callbacks<T>) -> Self {
    self.callbacks = callbacks;
    self
  }
}

/// Observable state of a mutation hook.
#[derive(Debug, Clone)]
pub struct MutationState<T> {
  pub phase: Phase,
  /// Response of the last successful mutation
  pub data: Option<T>,
  /// Error of the last failed mutation; cleared when a new one starts
  pub error: Option<FetchError>,
}

impl<T> Default for MutationState<T> {
  fn default() -> Self {
    Self {
      phase: Phase::Idle,
      data: None,
      error: None,
    }
  }
}

impl<T> MutationState<T> {
  pub fn is_loading(&self) -> bool {
    self.phase == Phase::Loading
  }

  pub fn is_error(&self) -> bool {
    self.phase == Phase::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }
}

type Outcome<T> = (u64, Result<T, FetchError>);

/// Write operation against one URL. Never cached, never retried.
///
/// Each [`mutate`](Self::mutate) call is one attempt; its outcome is applied by
/// [`poll`](Self::poll) or [`settled`](Self::settled). A newer call supersedes an
/// older one that is still in flight.
pub struct MutationHook<T> {
  client: FetchClient,
  url: String,
  method: MutationMethod,
  options: MutateOptions<T>,
  state: MutationState<T>,
  generation: u64,
  tx: mpsc::UnboundedSender<Outcome<T>>,
  rx: mpsc::UnboundedReceiver<Outcome<T>>,
}

impl<T> MutationHook<T>
where
  T: DeserializeOwned + Send + 'static,
{
  pub fn new(
    client: FetchClient,
    url: impl Into<String>,
    method: MutationMethod,
    options: MutateOptions<T>,
  ) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      client,
      url: url.into(),
      method,
      options,
      state: MutationState::default(),
      generation: 0,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.state.error()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  /// Send `body` with this hook's method. Must be called inside a tokio runtime.
  pub fn mutate<B: Serialize + ?Sized>(&mut self, body: &B) {
    self.generation += 1;
    let generation = self.generation;
    self.state.phase = Phase::Loading;
    self.state.error = None;

    let body: Value = match serde_json::to_value(body) {
      Ok(body) => body,
      Err(e) => {
        self.finish(generation, Err(FetchError::serialization(e)));
        return;
      }
    };

    let client = self.client.clone();
    let url = self.url.clone();
    let method = self.method;
    let request = self.options.request.clone();
    let tx = self.tx.clone();

    debug!(url = %url, %generation, "mutation started");
    tokio::spawn(async move {
      let result = client
        .send(method, &url, &request, body)
        .await
        .and_then(|data| serde_json::from_value(data).map_err(FetchError::serialization));
      // Ignore send errors - the hook may have been dropped
      let _ = tx.send((generation, result));
    });
  }

  /// Apply any outcome that has arrived. Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok((generation, result)) = self.rx.try_recv() {
      changed |= self.finish(generation, result);
    }
    changed
  }

  /// Wait for the current mutation to finish and return the resulting state.
  pub async fn settled(&mut self) -> &MutationState<T> {
    while self.state.is_loading() {
      match self.rx.recv().await {
        Some((generation, result)) => {
          self.finish(generation, result);
        }
        None => break,
      }
    }
    &self.state
  }

  fn finish(&mut self, generation: u64, result: Result<T, FetchError>) -> bool {
    if generation != self.generation || !self.state.is_loading() {
      return false;
    }

    match result {
      Ok(data) => {
        self.state.phase = Phase::Success;
        self.state.data = Some(data);
        if let Some(data) = self.state.data.as_ref() {
          self.options.callbacks.success(data);
        }
      }
      Err(error) => {
        info!(url = %self.url, method = ?self.method, %error, "mutation failed");
        self.state.phase = Phase::Error;
        self.state.error = Some(error);
        if let Some(error) = self.state.error.as_ref() {
          self.options.callbacks.error(error);
        }
      }
    }

    self
      .options
      .callbacks
      .settled(self.state.data.as_ref(), self.state.error.as_ref());
    true
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for MutationHook<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MutationHook")
      .field("url", &self.url)
      .field("method", &self.method)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TransportError;
  use crate::test_support::{test_client, ScriptedTransport};
  use crate::transport::Method;
  use serde_json::json;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn counting_callbacks(
    success: &Arc<AtomicUsize>,
    error: &Arc<AtomicUsize>,
    settled: &Arc<AtomicUsize>,
  ) -> Callbacks<Value> {
    let (s, e, d) = (success.clone(), error.clone(), settled.clone());
    Callbacks::default()
      .on_success(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
      })
      .on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
      })
      .on_settled(move |_, _| {
        d.fetch_add(1, Ordering::SeqCst);
      })
  }

  #[tokio::test]
  async fn test_mutation_success() {
    let transport = ScriptedTransport::ok(json!({"id": 7}));
    let (client, _dir) = test_client(transport.clone());
    let (success, error, settled) = Default::default();

    let mut hook = MutationHook::new(
      client,
      "/items",
      MutationMethod::Post,
      MutateOptions::new().callbacks(counting_callbacks(&success, &error, &settled)),
    );
    assert_eq!(hook.state().phase, Phase::Idle);

    hook.mutate(&json!({"name": "widget"}));
    assert!(hook.is_loading());

    let state = hook.settled().await;
    assert_eq!(state.phase, Phase::Success);
    assert_eq!(state.data(), Some(&json!({"id": 7})));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url, "/items");
    assert_eq!(requests[0].body, Some(json!({"name": "widget"})));

    assert_eq!(success.load(Ordering::SeqCst), 1);
    assert_eq!(error.load(Ordering::SeqCst), 0);
    assert_eq!(settled.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_mutation_failure_is_terminal() {
    let transport = ScriptedTransport::failing();
    let (client, _dir) = test_client(transport.clone());
    let (success, error, settled) = Default::default();

    let mut hook = MutationHook::new(
      client,
      "/items/1",
      MutationMethod::Delete,
      MutateOptions::new().callbacks(counting_callbacks(&success, &error, &settled)),
    );

    hook.mutate(&());
    let state = hook.settled().await;
    assert!(state.is_error());
    assert_eq!(
      state.error(),
      Some(&FetchError::from(TransportError::new("failure #1")))
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!hook.poll());
    assert_eq!(transport.calls(), 1, "mutations are never retried");
    assert_eq!(success.load(Ordering::SeqCst), 0);
    assert_eq!(error.load(Ordering::SeqCst), 1);
    assert_eq!(settled.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_mutation_bypasses_cache() {
    let transport = ScriptedTransport::ok(json!("ok"));
    let (client, _dir) = test_client(transport.clone());

    let mut hook: MutationHook<Value> =
      MutationHook::new(client.clone(), "/items", MutationMethod::Put, MutateOptions::new());
    hook.mutate(&json!(1));
    hook.settled().await;
    hook.mutate(&json!(2));
    hook.settled().await;

    assert_eq!(transport.calls(), 2);
    assert!(client.cache().peek("/items").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_call_options_override_config() {
    let transport = ScriptedTransport::ok(json!(null));
    let (client, _dir) = test_client(transport.clone());

    let mut hook: MutationHook<Value> = MutationHook::new(
      client,
      "/items",
      MutationMethod::Patch,
      MutateOptions::new().request(RequestOptions::new().token("call-token")),
    );
    hook.mutate(&json!({}));
    hook.settled().await;

    let requests = transport.requests();
    // test_client configures "config-token"
    assert_eq!(requests[0].options.token.as_deref(), Some("call-token"));
    assert_eq!(requests[0].method, Method::Patch);
  }

  #[tokio::test(start_paused = true)]
  async fn test_newer_mutation_supersedes_older() {
    let transport = ScriptedTransport::new(|request, _| {
      if request.body == Some(json!("first")) {
        (Duration::from_secs(5), Ok(json!("first")))
      } else {
        (Duration::ZERO, Ok(json!("second")))
      }
    });
    let (client, _dir) = test_client(transport.clone());

    let mut hook: MutationHook<Value> =
      MutationHook::new(client, "/items", MutationMethod::Post, MutateOptions::new());
    hook.mutate(&json!("first"));
    hook.mutate(&json!("second"));

    assert_eq!(hook.settled().await.data(), Some(&json!("second")));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!hook.poll());
    assert_eq!(hook.data(), Some(&json!("second")));
  }

  #[tokio::test]
  async fn test_unencodable_body_fails_without_request() {
    let transport = ScriptedTransport::ok(json!(null));
    let (client, _dir) = test_client(transport.clone());

    let mut hook: MutationHook<Value> =
      MutationHook::new(client, "/items", MutationMethod::Post, MutateOptions::new());
    // JSON object keys must be strings
    let body = BTreeMap::from([(vec![1u8], 1)]);
    hook.mutate(&body);

    assert!(hook.is_error());
    assert!(matches!(hook.error(), Some(FetchError::Serialization(_))));
    assert_eq!(transport.calls(), 0);
  }
}
