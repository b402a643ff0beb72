//! Pure state machine behind [`super::FetchHook`].
//!
//! `transition` maps `(state, event)` to a new state plus a list of effects. It does
//! no I/O and starts no timers; the hook executes the effects. Every attempt carries
//! the generation that started it, and events from an older generation are ignored,
//! so a superseded request can never overwrite newer state.

use std::time::Duration;

use crate::constants::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::error::FetchError;

/// Lifecycle phase of a hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
  /// Nothing requested yet
  #[default]
  Idle,
  /// An attempt is in flight or a retry is pending
  Loading,
  /// The last cycle produced data
  Success,
  /// The last cycle exhausted its retries
  Error,
}

/// Observable state of a fetch hook.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
  pub phase: Phase,
  /// Latest successful payload; kept while a new cycle is loading
  pub data: Option<T>,
  /// Error that ended the last cycle; cleared on success
  pub error: Option<FetchError>,
  /// 1-based attempt number within the current cycle
  pub attempt: u32,
  /// Incremented each time a cycle starts
  pub generation: u64,
}

impl<T> Default for FetchState<T> {
  fn default() -> Self {
    Self {
      phase: Phase::Idle,
      data: None,
      error: None,
      attempt: 0,
      generation: 0,
    }
  }
}

impl<T> FetchState<T> {
  pub fn is_loading(&self) -> bool {
    self.phase == Phase::Loading
  }

  pub fn is_success(&self) -> bool {
    self.phase == Phase::Success
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

/// Retry settings for a fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first failure; a cycle makes at most `retries + 1` attempts
  pub retries: u32,
  /// Fixed delay before each retry
  pub retry_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retries: DEFAULT_RETRIES,
      retry_delay: DEFAULT_RETRY_DELAY,
    }
  }
}

/// Inputs to the machine.
#[derive(Debug, Clone)]
pub enum FetchEvent<T> {
  /// Begin a new cycle (mount, key change, refetch, focus)
  Start,
  /// An attempt finished
  Resolved {
    generation: u64,
    result: Result<T, FetchError>,
  },
  /// A scheduled retry delay elapsed
  RetryElapsed { generation: u64 },
}

/// Work the hook must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
  /// Abort any pending retry timer
  CancelRetry,
  /// Issue attempt `attempt` of cycle `generation`
  Request { generation: u64, attempt: u32 },
  /// Deliver `RetryElapsed { generation }` after `delay`
  ScheduleRetry { generation: u64, delay: Duration },
  /// Invoke the success callback with the current data
  NotifySuccess,
  /// Invoke the error callback with the current error
  NotifyError,
  /// Invoke the settled callback with the current data and error
  NotifySettled,
}

/// Compute the next state and the effects to run.
pub fn transition<T>(
  state: FetchState<T>,
  event: FetchEvent<T>,
  policy: &RetryPolicy,
) -> (FetchState<T>, Vec<Effect>) {
  match event {
    FetchEvent::Start => {
      let generation = state.generation + 1;
      let next = FetchState {
        phase: Phase::Loading,
        attempt: 1,
        generation,
        ..state
      };
      (
        next,
        vec![
          Effect::CancelRetry,
          Effect::Request {
            generation,
            attempt: 1,
          },
        ],
      )
    }

    FetchEvent::Resolved { generation, .. } | FetchEvent::RetryElapsed { generation }
      if generation != state.generation || state.phase != Phase::Loading =>
    {
      (state, Vec::new())
    }

    FetchEvent::Resolved {
      result: Ok(data), ..
    } => {
      let next = FetchState {
        phase: Phase::Success,
        data: Some(data),
        error: None,
        ..state
      };
      (next, vec![Effect::NotifySuccess, Effect::NotifySettled])
    }

    FetchEvent::Resolved {
      generation,
      result: Err(error),
    } => {
      if state.attempt <= policy.retries {
        let effects = vec![Effect::ScheduleRetry {
          generation,
          delay: policy.retry_delay,
        }];
        (state, effects)
      } else {
        let next = FetchState {
          phase: Phase::Error,
          error: Some(error),
          ..state
        };
        (next, vec![Effect::NotifyError, Effect::NotifySettled])
      }
    }

    FetchEvent::RetryElapsed { generation } => {
      let attempt = state.attempt + 1;
      let next = FetchState { attempt, ..state };
      (next, vec![Effect::Request { generation, attempt }])
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TransportError;

  fn policy(retries: u32) -> RetryPolicy {
    RetryPolicy {
      retries,
      retry_delay: Duration::from_millis(1_000),
    }
  }

  fn failure() -> FetchError {
    TransportError::new("down").into()
  }

  #[test]
  fn test_start_enters_loading_and_requests() {
    let (state, effects) = transition(FetchState::<i32>::default(), FetchEvent::Start, &policy(3));

    assert_eq!(state.phase, Phase::Loading);
    assert_eq!(state.generation, 1);
    assert_eq!(state.attempt, 1);
    assert_eq!(
      effects,
      vec![
        Effect::CancelRetry,
        Effect::Request {
          generation: 1,
          attempt: 1
        }
      ]
    );
  }

  #[test]
  fn test_success_clears_error() {
    let (state, _) = transition(FetchState::<i32>::default(), FetchEvent::Start, &policy(0));
    let (state, _) = transition(
      state,
      FetchEvent::Resolved {
        generation: 1,
        result: Err(failure()),
      },
      &policy(0),
    );
    assert!(state.is_error());

    let (state, _) = transition(state, FetchEvent::Start, &policy(0));
    let (state, effects) = transition(
      state,
      FetchEvent::Resolved {
        generation: 2,
        result: Ok(7),
      },
      &policy(0),
    );

    assert!(state.is_success());
    assert_eq!(state.data(), Some(&7));
    assert!(state.error().is_none());
    assert_eq!(effects, vec![Effect::NotifySuccess, Effect::NotifySettled]);
  }

  #[test]
  fn test_retry_bound_gives_n_plus_one_attempts() {
    let policy = policy(3);
    let (mut state, mut effects) =
      transition(FetchState::<i32>::default(), FetchEvent::Start, &policy);
    let mut requests = 0;

    loop {
      let mut next_event = None;
      for effect in effects {
        match effect {
          Effect::Request { generation, .. } => {
            requests += 1;
            next_event = Some(FetchEvent::Resolved {
              generation,
              result: Err(failure()),
            });
          }
          Effect::ScheduleRetry { generation, .. } => {
            next_event = Some(FetchEvent::RetryElapsed { generation });
          }
          _ => {}
        }
      }
      match next_event {
        Some(event) => (state, effects) = transition(state, event, &policy),
        None => break,
      }
    }

    assert_eq!(requests, 4);
    assert!(state.is_error());
    assert_eq!(state.attempt, 4);
    assert_eq!(state.error(), Some(&failure()));
  }

  #[test]
  fn test_failure_within_budget_stays_loading() {
    let (state, _) = transition(FetchState::<i32>::default(), FetchEvent::Start, &policy(1));
    let (state, effects) = transition(
      state,
      FetchEvent::Resolved {
        generation: 1,
        result: Err(failure()),
      },
      &policy(1),
    );

    assert!(state.is_loading());
    assert!(state.error().is_none());
    assert_eq!(
      effects,
      vec![Effect::ScheduleRetry {
        generation: 1,
        delay: Duration::from_millis(1_000)
      }]
    );
  }

  #[test]
  fn test_superseded_generation_is_ignored() {
    let (state, _) = transition(FetchState::<&str>::default(), FetchEvent::Start, &policy(3));
    let (state, _) = transition(state, FetchEvent::Start, &policy(3));
    assert_eq!(state.generation, 2);

    let (state, effects) = transition(
      state,
      FetchEvent::Resolved {
        generation: 1,
        result: Ok("old"),
      },
      &policy(3),
    );
    assert!(effects.is_empty());
    assert!(state.is_loading());
    assert_eq!(state.data(), None);

    let (state, effects) =
      transition(state, FetchEvent::RetryElapsed { generation: 1 }, &policy(3));
    assert!(effects.is_empty());
    assert_eq!(state.attempt, 1);
  }

  #[test]
  fn test_start_keeps_previous_data() {
    let (state, _) = transition(FetchState::default(), FetchEvent::Start, &policy(0));
    let (state, _) = transition(
      state,
      FetchEvent::Resolved {
        generation: 1,
        result: Ok("first"),
      },
      &policy(0),
    );
    let (state, _) = transition(state, FetchEvent::Start, &policy(0));

    assert!(state.is_loading());
    assert_eq!(state.data(), Some(&"first"));
  }
}
