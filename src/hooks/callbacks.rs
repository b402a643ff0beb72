//! User callbacks fired on hook outcomes.

use crate::error::FetchError;

type SuccessFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&FetchError) + Send + Sync>;
type SettledFn<T> = Box<dyn Fn(Option<&T>, Option<&FetchError>) + Send + Sync>;

/// Optional success / error / settled callbacks.
pub struct Callbacks<T> {
  on_success: Option<SuccessFn<T>>,
  on_error: Option<ErrorFn>,
  on_settled: Option<SettledFn<T>>,
}

impl<T> Default for Callbacks<T> {
  fn default() -> Self {
    Self {
      on_success: None,
      on_error: None,
      on_settled: None,
    }
  }
}

impl<T> Callbacks<T> {
  pub fn on_success(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
    self.on_success = Some(Box::new(f));
    self
  }

  pub fn on_error(mut self, f: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Box::new(f));
    self
  }

  pub fn on_settled(
    mut self,
    f: impl Fn(Option<&T>, Option<&FetchError>) + Send + Sync + 'static,
  ) -> Self {
    self.on_settled = Some(Box::new(f));
    self
  }

  pub(crate) fn success(&self, data: &T) {
    if let Some(f) = &self.on_success {
      f(data);
    }
  }

  pub(crate) fn error(&self, error: &FetchError) {
    if let Some(f) = &self.on_error {
      f(error);
    }
  }

  pub(crate) fn settled(&self, data: Option<&T>, error: Option<&FetchError>) {
    if let Some(f) = &self.on_settled {
      f(data, error);
    }
  }
}

impl<T> std::fmt::Debug for Callbacks<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Callbacks")
      .field("on_success", &self.on_success.is_some())
      .field("on_error", &self.on_error.is_some())
      .field("on_settled", &self.on_settled.is_some())
      .finish()
  }
}
