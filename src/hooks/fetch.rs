//! Cached GET hook with retries, focus revalidation, and teardown safety.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::callbacks::Callbacks;
use super::focus::FocusListener;
use super::machine::{transition, Effect, FetchEvent, FetchState, RetryPolicy};
use crate::client::FetchClient;
use crate::config::RequestOptions;
use crate::constants::DEFAULT_CACHE_DURATION;
use crate::error::FetchError;

/// Per-call options for a [`FetchHook`].
#[derive(Debug)]
pub struct FetchOptions<T> {
  pub request: RequestOptions,
  /// How long a cached response is served before refetching
  pub cache_duration: Duration,
  pub retry: RetryPolicy,
  /// Start a new cycle whenever the client reports regained focus
  pub revalidate_on_focus: bool,
  /// Do not fetch on mount or update; wait for [`FetchHook::refetch`]
  pub lazy: bool,
  /// Drop the cached entry before the first attempt of every cycle
  pub invalidate: bool,
  pub callbacks: Callbacks<T>,
}

impl<T> Default for FetchOptions<T> {
  fn default() -> Self {
    Self {
      request: RequestOptions::default(),
      cache_duration: DEFAULT_CACHE_DURATION,
      retry: RetryPolicy::default(),
      revalidate_on_focus: false,
      lazy: false,
      invalidate: false,
      callbacks: Callbacks::default(),
    }
  }
}

impl<T> FetchOptions<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request(mut self, request: RequestOptions) -> Self {
    self.request = request;
    self
  }

  pub fn cache_duration(mut self, cache_duration: Duration) -> Self {
    self.cache_duration = cache_duration;
    self
  }

  pub fn retries(mut self, retries: u32) -> Self {
    self.retry.retries = retries;
    self
  }

  pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
    self.retry.retry_delay = retry_delay;
    self
  }

  pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
    self.revalidate_on_focus = enabled;
    self
  }

  pub fn lazy(mut self, lazy: bool) -> Self {
    self.lazy = lazy;
    self
  }

  pub fn invalidate(mut self, invalidate: bool) -> Self {
    self.invalidate = invalidate;
    self
  }

  pub fn callbacks(mut self, callbacks: Callbacks<T>) -> Self {
    self.callbacks = callbacks;
    self
  }
}

/// A mounted data-fetching hook.
///
/// FetchHook<T> encapsulates:
/// - Read-through cached fetching of one URL via the client's cache manager
/// - Bounded retries with a fixed delay
/// - Success / error / settled callbacks
/// - Optional refetch when the client signals regained focus
///
/// Results arrive asynchronously; call [`poll`](Self::poll) from your event loop or
/// await [`settled`](Self::settled). Must be created inside a tokio runtime.
///
/// Dropping the hook (or calling [`unmount`](Self::unmount)) cancels any pending
/// retry timer. Attempts already in flight run to completion but their results are
/// discarded.
///
/// # Example
///
/// ```ignore
/// let mut users = FetchHook::<Vec<User>>::mount(client.clone(), "/users", FetchOptions::new());
///
/// // In event loop tick
/// if users.poll() {
///     // State changed, trigger re-render
/// }
/// ```
pub struct FetchHook<T> {
  client: FetchClient,
  url: String,
  options: FetchOptions<T>,
  state: FetchState<T>,
  tx: mpsc::UnboundedSender<FetchEvent<T>>,
  rx: mpsc::UnboundedReceiver<FetchEvent<T>>,
  retry_timer: Option<JoinHandle<()>>,
  focus: Option<FocusListener>,
}

impl<T> FetchHook<T>
where
  T: DeserializeOwned + Send + 'static,
{
  /// Mount a hook for `url`, starting the first fetch unless `options.lazy` is set.
  pub fn mount(client: FetchClient, url: impl Into<String>, options: FetchOptions<T>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut hook = Self {
      client,
      url: url.into(),
      options,
      state: FetchState::default(),
      tx,
      rx,
      retry_timer: None,
      focus: None,
    };

    hook.bind_focus();
    if !hook.options.lazy {
      hook.dispatch(FetchEvent::Start);
    }

    hook
  }

  pub fn state(&self) -> &FetchState<T> {
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

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Start a new fetch cycle, superseding any cycle in progress.
  pub fn refetch(&mut self) {
    self.dispatch(FetchEvent::Start);
  }

  /// Switch to a new URL and/or options.
  ///
  /// Whatever the previous cycle was doing is superseded; late results from it are
  /// ignored.
  pub fn update(&mut self, url: impl Into<String>, options: FetchOptions<T>) {
    self.url = url.into();
    self.options = options;
    self.bind_focus();

    if self.options.lazy {
      self.supersede();
    } else {
      self.dispatch(FetchEvent::Start);
    }
  }

  /// Bind or unbind the focus listener.
  pub fn set_revalidate_on_focus(&mut self, enabled: bool) {
    self.options.revalidate_on_focus = enabled;
    self.bind_focus();
  }

  /// Apply every result, timer, and focus notification that has arrived.
  ///
  /// Returns `true` if the state changed. Never blocks.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if self.focus.as_mut().is_some_and(FocusListener::take) {
      debug!(url = %self.url, "focus regained, revalidating");
      changed |= self.dispatch(FetchEvent::Start);
    }

    while let Ok(event) = self.rx.try_recv() {
      changed |= self.dispatch(event);
    }

    changed
  }

  /// Wait for the next result, timer, or focus notification and apply it.
  ///
  /// Returns `true` if the state changed.
  pub async fn next_event(&mut self) -> bool {
    let event = match self.focus.as_mut() {
      Some(focus) => tokio::select! {
        event = self.rx.recv() => event,
        _ = focus.recv() => Some(FetchEvent::Start),
      },
      None => self.rx.recv().await,
    };

    match event {
      Some(event) => self.dispatch(event),
      None => false,
    }
  }

  /// Wait until no attempt is outstanding and return the resulting state.
  pub async fn settled(&mut self) -> &FetchState<T> {
    while self.state.is_loading() {
      match self.rx.recv().await {
        Some(event) => {
          self.dispatch(event);
        }
        None => break,
      }
    }
    &self.state
  }

  /// Tear the hook down. Equivalent to dropping it.
  pub fn unmount(self) {
    debug!(url = %self.url, "unmounting fetch hook");
  }

  fn bind_focus(&mut self) {
    match (self.options.revalidate_on_focus, self.focus.is_some()) {
      (true, false) => self.focus = Some(self.client.focus().subscribe()),
      (false, true) => self.focus = None,
      _ => {}
    }
  }

  /// Run an event through the machine and carry out its effects.
  fn dispatch(&mut self, event: FetchEvent<T>) -> bool {
    let state = std::mem::take(&mut self.state);
    let (next, effects) = transition(state, event, &self.options.retry);
    self.state = next;

    let changed = !effects.is_empty();
    for effect in effects {
      self.run(effect);
    }
    changed
  }

  /// Invalidate the current cycle without starting another.
  fn supersede(&mut self) {
    self.cancel_retry();
    self.state.generation += 1;
    if self.state.is_loading() {
      self.state.phase = super::Phase::Idle;
    }
  }

  fn run(&mut self, effect: Effect) {
    match effect {
      Effect::CancelRetry => self.cancel_retry(),
      Effect::Request {
        generation,
        attempt,
      } => self.spawn_request(generation, attempt),
      Effect::ScheduleRetry { generation, delay } => {
        warn!(
          url = %self.url,
          attempt = self.state.attempt,
          delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
          "fetch attempt failed, retrying"
        );
        self.cancel_retry();
        let tx = self.tx.clone();
        self.retry_timer = Some(tokio::spawn(async move {
          tokio::time::sleep(delay).await;
          let _ = tx.send(FetchEvent::RetryElapsed { generation });
        }));
      }
      Effect::NotifySuccess => {
        if let Some(data) = self.state.data.as_ref() {
          self.options.callbacks.success(data);
        }
      }
      Effect::NotifyError => {
        if let Some(error) = self.state.error.as_ref() {
          info!(url = %self.url, attempts = self.state.attempt, %error, "fetch failed");
          self.options.callbacks.error(error);
        }
      }
      Effect::NotifySettled => self
        .options
        .callbacks
        .settled(self.state.data.as_ref(), self.state.error.as_ref()),
    }
  }

  fn spawn_request(&self, generation: u64, attempt: u32) {
    let client = self.client.clone();
    let url = self.url.clone();
    let request = self.options.request.clone();
    let cache_duration = self.options.cache_duration;
    let invalidate = self.options.invalidate && attempt == 1;
    let tx = self.tx.clone();

    debug!(url = %url, generation, attempt, "fetch attempt");
    tokio::spawn(async move {
      let result = fetch_typed(&client, &url, &request, cache_duration, invalidate).await;
      // Ignore send errors - the hook may have been unmounted
      let _ = tx.send(FetchEvent::Resolved { generation, result });
    });
  }

  fn cancel_retry(&mut self) {
    if let Some(timer) = self.retry_timer.take() {
      timer.abort();
    }
  }
}

async fn fetch_typed<T: DeserializeOwned>(
  client: &FetchClient,
  url: &str,
  request: &RequestOptions,
  cache_duration: Duration,
  invalidate: bool,
) -> Result<T, FetchError> {
  if invalidate {
    client.invalidate(url)?;
  }
  let result = client.get(url, request, cache_duration).await?;
  serde_json::from_value(result.data).map_err(FetchError::serialization)
}

impl<T> Drop for FetchHook<T> {
  fn drop(&mut self) {
    if let Some(timer) = self.retry_timer.take() {
      timer.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for FetchHook<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FetchHook")
      .field("url", &self.url)
      .field("state", &self.state)
      .field("retry_pending", &self.retry_timer.is_some())
      .field("focus_bound", &self.focus.is_some())
      .finish_non_exhaustive()
  }
}
