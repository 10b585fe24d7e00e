use crate::auth::{Authenticator, ErrorCallback, SharedSession, TokenRenewalScheduler};
use crate::cache::{SecretCache, cache_key};
use crate::clock::{Clock, default_clock};
use crate::config::{ClientConfig, RawConfig, TlsConfig};
use crate::error::{Result, SecretStoreError};
use crate::executor::{ExecutorSettings, RequestExecutor};
use crate::metrics::{Metrics, MetricsCollector};
use crate::models::{Secret, SecretList};
use crate::scheduler::{Scheduler, default_scheduler};
use crate::state::{ClientState, StateCell};
use crate::transport::{HttpTransport, ReqwestTransport};
use reqwest::Method;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const KV_MOUNT: &str = "secret";

/// KV v2 endpoint for `path` under the given section (`data`, `metadata`, `delete`).
/// A leading `secret/` mount segment in `path` is accepted and dropped.
fn kv_endpoint(section: &str, path: &str) -> String {
    format!("/v1/{}/{}/{}", KV_MOUNT, section, kv_path(path))
}

/// Secret path relative to the KV mount; `secret/app/db` and `/app/db` are the same secret.
fn kv_path(path: &str) -> &str {
    let path = normalize_path(path);
    path.strip_prefix(KV_MOUNT)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

pub struct SecretStoreClientBuilder {
    raw: RawConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    on_renewal_error: Option<ErrorCallback>,
}

impl Default for SecretStoreClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStoreClientBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawConfig::default(),
            transport: None,
            clock: None,
            scheduler: None,
            on_renewal_error: None,
        }
    }

    /// Starts from `VAULT_*` environment variables. Later setters override them.
    pub fn from_env() -> Self {
        Self {
            raw: RawConfig::from_env(),
            ..Self::new()
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.raw.address = Some(address.into());
        self
    }

    /// Selects the strategy by name (`token` or `approle`).
    pub fn auth_method(mut self, method: impl Into<String>) -> Self {
        self.raw.auth_method = Some(method.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.raw.token = Some(token.into());
        self
    }

    pub fn app_role(mut self, role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        self.raw.role_id = Some(role_id.into());
        self.raw.secret_id = Some(secret_id.into());
        self
    }

    pub fn app_role_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.raw.mount_path = Some(mount_path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.raw.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.raw.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.raw.retry_delay = Some(delay);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.raw.cache_enabled = Some(enabled);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.raw.cache_ttl = Some(ttl);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.raw.namespace = Some(namespace.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.raw.debug = Some(debug);
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.raw.tls = Some(tls);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn on_renewal_error(mut self, callback: impl Fn(&SecretStoreError) + Send + Sync + 'static) -> Self {
        self.on_renewal_error = Some(Arc::new(callback));
        self
    }

    /// Validates the configuration and wires the client. No network calls are made.
    pub fn build(self) -> Result<SecretStoreClient> {
        let config = self.raw.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.tls.as_ref())?),
        };
        let clock = self.clock.unwrap_or_else(default_clock);
        let scheduler = self.scheduler.unwrap_or_else(default_scheduler);

        let session: SharedSession = Arc::new(RwLock::new(None));
        let metrics = Arc::new(MetricsCollector::new());
        let state = Arc::new(StateCell::new());

        let executor = Arc::new(RequestExecutor::new(
            ExecutorSettings {
                base_url: config.address.clone(),
                namespace: config.namespace.clone(),
                timeout: config.timeout,
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
                debug: config.debug,
            },
            transport,
            Arc::clone(&session),
            Arc::clone(&metrics),
        ));
        let authenticator = Arc::new(Authenticator::new(
            config.credentials.clone(),
            Arc::clone(&executor),
            session,
            Arc::clone(&metrics),
            Arc::clone(&clock),
        ));
        let renewal = Arc::new(TokenRenewalScheduler::new(
            Arc::clone(&authenticator),
            scheduler,
            Arc::clone(&clock),
            Arc::clone(&state),
            self.on_renewal_error,
            config.debug,
        ));

        Ok(SecretStoreClient {
            cache: SecretCache::new(config.cache_ttl, clock),
            config,
            executor,
            authenticator,
            renewal,
            metrics,
            state,
            init_lock: Mutex::new(()),
        })
    }
}

/// Client for a Vault-compatible KV v2 secret store.
///
/// Authenticates lazily on first use, keeps the session token renewed in the
/// background, and serves repeated reads from a per-instance TTL cache.
/// Writes and deletes invalidate cached entries for their path so the next
/// read always observes them.
pub struct SecretStoreClient {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    authenticator: Arc<Authenticator>,
    renewal: Arc<TokenRenewalScheduler>,
    cache: SecretCache<Secret>,
    metrics: Arc<MetricsCollector>,
    state: Arc<StateCell>,
    init_lock: Mutex<()>,
}

impl SecretStoreClient {
    pub fn builder() -> SecretStoreClientBuilder {
        SecretStoreClientBuilder::new()
    }

    pub fn from_env() -> Result<Self> {
        SecretStoreClientBuilder::from_env().build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    /// Authenticates and arms token renewal. No-op once the client is ready.
    ///
    /// On failure the error is returned and the client stays in its previous
    /// state; a later call retries from scratch.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        let previous = self.state.get();
        match previous {
            ClientState::ShutDown => return Err(SecretStoreError::ShutDown),
            state if state.is_ready() => return Ok(()),
            _ => {}
        }

        if !self.state.advance(ClientState::Authenticating) {
            return Err(SecretStoreError::ShutDown);
        }

        match self.authenticator.authenticate().await {
            Ok(info) => {
                if !self.state.advance(ClientState::Ready) {
                    return Err(SecretStoreError::ShutDown);
                }
                self.renewal.schedule(info.expires_at);
                if self.config.debug {
                    tracing::debug!(address = %self.config.address, "secret store client initialized");
                }
                Ok(())
            }
            Err(e) => {
                self.state.advance(previous);
                Err(e)
            }
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        match self.state.get() {
            ClientState::ShutDown => Err(SecretStoreError::ShutDown),
            ClientState::Uninitialized | ClientState::Authenticating => self.initialize().await,
            _ => Ok(()),
        }
    }

    /// Reads the latest secret at `path`, or a pinned `version`.
    pub async fn get_secret(&self, path: &str, version: Option<u64>) -> Result<Secret> {
        self.ensure_ready().await?;

        let key = cache_key(kv_path(path), version);
        if self.config.cache_enabled {
            let cached = self.cache.get(&key).await;
            self.metrics.record_cache_lookup(cached.is_some());
            if let Some(secret) = cached {
                if self.config.debug {
                    tracing::debug!(key = %key, "secret served from cache");
                }
                return Ok(secret);
            }
        }

        let mut endpoint = kv_endpoint("data", path);
        if let Some(version) = version {
            endpoint.push_str(&format!("?version={}", version));
        }

        // A write that lands while this read is in flight invalidates the cache;
        // the result of this read must not be cached then.
        let generation = self.cache.generation();
        let response = self.executor.execute(Method::GET, &endpoint, None).await?;
        let secret = Secret::from_kv_response(response)?;

        if self.config.cache_enabled
            && !self.cache.set_if_current(key.clone(), secret.clone(), generation).await
            && self.config.debug
        {
            tracing::debug!(key = %key, "cache invalidated during read, result not cached");
        }
        Ok(secret)
    }

    /// Reads one key of the latest secret at `path`.
    ///
    /// With a `default`, a missing key or any read failure yields the default.
    pub async fn get_secret_value(&self, path: &str, key: &str, default: Option<Value>) -> Result<Value> {
        match self.get_secret(path, None).await {
            Ok(secret) => match secret.data.get(key) {
                Some(value) => Ok(value.clone()),
                None => default.ok_or_else(|| SecretStoreError::KeyNotFound {
                    path: path.to_string(),
                    key: key.to_string(),
                }),
            },
            Err(e) => match default {
                Some(value) => {
                    if self.config.debug {
                        tracing::debug!(path, key, error = %e, "secret read failed, using default");
                    }
                    Ok(value)
                }
                None => Err(e),
            },
        }
    }

    /// Version metadata for `path` (`/metadata/` endpoint). Not cached.
    pub async fn get_secret_metadata(&self, path: &str) -> Result<HashMap<String, Value>> {
        self.ensure_ready().await?;

        let response = self
            .executor
            .execute(Method::GET, &kv_endpoint("metadata", path), None)
            .await?;
        match response.get("data") {
            Some(Value::Object(map)) => Ok(map.clone().into_iter().collect()),
            _ => Err(SecretStoreError::InvalidResponse(
                "Metadata response has no data".to_string(),
            )),
        }
    }

    /// Writes a new version of the secret at `path`.
    pub async fn put_secret(&self, path: &str, data: HashMap<String, Value>) -> Result<()> {
        self.ensure_ready().await?;

        self.executor
            .execute(Method::POST, &kv_endpoint("data", path), Some(json!({ "data": data })))
            .await?;
        self.invalidate(path).await;
        Ok(())
    }

    /// Soft-deletes the given versions, or removes the secret and all its
    /// versions when `versions` is `None` or empty.
    pub async fn delete_secret(&self, path: &str, versions: Option<&[u64]>) -> Result<()> {
        self.ensure_ready().await?;

        match versions {
            Some(versions) if !versions.is_empty() => {
                self.executor
                    .execute(
                        Method::DELETE,
                        &kv_endpoint("delete", path),
                        Some(json!({ "versions": versions })),
                    )
                    .await?;
            }
            _ => {
                self.executor
                    .execute(Method::DELETE, &kv_endpoint("metadata", path), None)
                    .await?;
            }
        }
        self.invalidate(path).await;
        Ok(())
    }

    /// Lists keys under `path`. Never cached.
    pub async fn list_secrets(&self, path: &str) -> Result<SecretList> {
        self.ensure_ready().await?;

        let endpoint = format!("/v1/{}?list=true", normalize_path(path));
        let response = self.executor.execute(Method::GET, &endpoint, None).await?;
        SecretList::from_list_response(response)
    }

    /// Whether the backend answers its health endpoint. Never fails.
    pub async fn health_check(&self) -> bool {
        match self.executor.execute(Method::GET, "/v1/sys/health", None).await {
            Ok(_) => true,
            Err(e) => {
                if self.config.debug {
                    tracing::debug!(error = %e, "health check failed");
                }
                false
            }
        }
    }

    pub fn get_metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Cancels renewal, drops cached secrets and the session. The client
    /// cannot be used afterwards. Safe to call at any point, repeatedly.
    pub async fn shutdown(&self) {
        self.state.shut_down();
        self.renewal.cancel();
        self.cache.clear().await;
        self.authenticator.clear().await;
        if self.config.debug {
            tracing::debug!("secret store client shut down");
        }
    }

    async fn invalidate(&self, path: &str) {
        let removed = self.cache.invalidate_prefix(kv_path(path)).await;
        if self.config.debug && removed > 0 {
            tracing::debug!(path, removed, "invalidated cached secrets");
        }
    }
}

impl Drop for SecretStoreClient {
    fn drop(&mut self) {
        // The pending timer holds the renewal scheduler alive; stop it with the client.
        self.state.shut_down();
        self.renewal.cancel();
    }
}
