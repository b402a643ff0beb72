//! Data-fetching hooks.
//!
//! Inspired by SWR / TanStack Query, a hook owns the lifecycle of one request site:
//! loading/success/error state, callbacks, and (for fetches) retries, caching and
//! focus revalidation. The transition logic lives in [`machine`] as a pure function;
//! the hooks only execute the effects it asks for.

mod callbacks;
mod fetch;
mod focus;
pub mod machine;
mod mutation;

pub use callbacks::Callbacks;
pub use fetch::{FetchHook, FetchOptions};
pub use focus::FocusSignal;
pub use machine::{FetchState, Phase, RetryPolicy};
pub use mutation::{MutateOptions, MutationHook, MutationState};
