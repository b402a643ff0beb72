//! Canonical defaults shared by the cache, transport, and hooks.

use std::time::Duration;

/// How long a cached response is served before it is refetched.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_millis(30_000);

/// Per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Retries after the first failed attempt of a fetch cycle.
pub const DEFAULT_RETRIES: u32 = 3;

/// Fixed delay between fetch attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(4_000);

/// Headers sent with every request unless overridden.
pub const BASIC_HEADERS: &[(&str, &str)] = &[
  ("Content-Type", "application/json"),
  ("Accept", "application/json"),
];

/// Application directory name under the XDG config/data dirs.
pub const APP_NAME: &str = "hookfetch";

/// File name of the cache database.
pub const DB_FILE: &str = "cache.db";

/// Table holding cache entries.
pub const STORE_NAME: &str = "cache_store";
