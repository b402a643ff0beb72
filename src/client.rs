//! The composition root handed to every hook.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheManager, CacheResult, CacheStorage};
use crate::config::{ConfigOptions, RequestOptions};
use crate::error::{FetchError, StoreError};
use crate::hooks::FocusSignal;
use crate::transport::{MutationMethod, Request, Transport};

/// Shared handle to configuration, cache, transport and focus notifications.
///
/// Build one at start-up and clone it into each hook; clones share everything.
/// Configuration is fixed for the client's lifetime.
#[derive(Clone)]
pub struct FetchClient {
  config: Arc<ConfigOptions>,
  cache: CacheManager,
  transport: Arc<dyn Transport>,
  focus: FocusSignal,
}

impl FetchClient {
  pub fn new(
    config: ConfigOptions,
    storage: Arc<dyn CacheStorage>,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self::with_cache(config, CacheManager::new(storage), transport)
  }

  pub fn with_cache(
    config: ConfigOptions,
    cache: CacheManager,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      config: Arc::new(config),
      cache,
      transport,
      focus: FocusSignal::new(),
    }
  }

  pub fn config(&self) -> &ConfigOptions {
    &self.config
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  pub fn focus(&self) -> &FocusSignal {
    &self.focus
  }

  /// Report that the application regained focus. Returns how many hooks listen.
  pub fn notify_focus(&self) -> usize {
    self.focus.notify()
  }

  /// Cached GET of `url`, served from the store while younger than `cache_duration`.
  pub async fn get(
    &self,
    url: &str,
    request: &RequestOptions,
    cache_duration: Duration,
  ) -> Result<CacheResult<Value>, FetchError> {
    let options = self.config.resolve(request);
    let transport = Arc::clone(&self.transport);

    self
      .cache
      .resolve(url, cache_duration, || async move {
        transport.send(Request::get(url, options)).await
      })
      .await
  }

  /// Uncached write request.
  pub async fn send(
    &self,
    method: MutationMethod,
    url: &str,
    request: &RequestOptions,
    body: Value,
  ) -> Result<Value, FetchError> {
    let options = self.config.resolve(request);
    let data = self
      .transport
      .send(Request::with_body(method, url, options, body))
      .await?;
    Ok(data)
  }

  pub fn invalidate(&self, url: &str) -> Result<(), StoreError> {
    self.cache.invalidate(url)
  }
}
