//! secret-store-client - client for Vault-compatible KV v2 secret stores
//!
//! Supports two authentication strategies:
//! 1. Static token, verified via `lookup-self`
//! 2. AppRole login (`role_id` + `secret_id`)
//!
//! The session token is renewed in the background before it expires, reads
//! are cached per client with a TTL, and every request is retried with
//! exponential backoff on server errors, throttling and transport failures.

mod auth;
mod cache;
mod classify;
mod client;
mod clock;
mod config;
mod error;
mod executor;
mod metrics;
mod models;
mod scheduler;
mod state;
mod transport;

pub use auth::{ErrorCallback, MIN_RENEWAL_DELAY, RENEWAL_FRACTION, TokenInfo, renewal_delay};
pub use cache::{CacheEntry, SecretCache, cache_key};
pub use classify::is_retryable_status;
pub use client::{SecretStoreClient, SecretStoreClientBuilder};
pub use clock::{Clock, MockClock, default_clock};
pub use config::{
    AuthMethodKind, ClientConfig, Credentials, DEFAULT_APPROLE_MOUNT, DEFAULT_CACHE_TTL, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT, TlsConfig,
};
pub use error::{RequestError, Result, SecretStoreError};
pub use executor::backoff_delay;
pub use metrics::Metrics;
pub use models::{Lease, Secret, SecretList};
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, TimerHandle, TokioScheduler, default_scheduler};
pub use state::ClientState;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
