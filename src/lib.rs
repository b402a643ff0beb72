//! Data-fetching hooks with a persistent, time-expiring request cache.
//!
//! - [`FetchClient`] bundles the configuration defaults, the [`CacheManager`], and a
//!   [`Transport`]; build it once and clone it into hooks.
//! - [`FetchHook`] drives cached GET requests with retries and focus revalidation.
//! - [`MutationHook`] sends uncached write requests.
//! - [`SqliteStorage`] keeps cache entries across restarts.

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use cache::{CacheEntry, CacheManager, CacheResult, CacheSource, CacheStorage, SqliteStorage};
pub use client::FetchClient;
pub use config::{ConfigOptions, RequestOptions};
pub use error::{FetchError, StoreError, TransportError};
pub use hooks::{Callbacks, FetchHook, FetchOptions, MutateOptions, MutationHook, Phase};
pub use transport::{HttpTransport, Method, MutationMethod, ResponseType, Transport};
