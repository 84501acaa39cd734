//! Signing key set cache for the identity provider.
//!
//! - Readers take an `Arc` snapshot under a short read lock, so a verification
//!   never sees a half-installed key set.
//! - Refreshes are single-flight: concurrent misses wait on one fetch.
//! - A failed or empty fetch never replaces the installed set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("key set fetch failed: {0}")]
    Fetch(String),
    #[error("key set fetch timed out")]
    Timeout,
    #[error("key set contained no usable signing keys")]
    Empty,
}

/// Why a key lookup for a specific `kid` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLookupError {
    Unknown,
    Timeout,
}

/// Where signing keys come from (the IdP's JWKS endpoint in production).
#[async_trait]
pub trait KeySource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<JwkSet, KeySetError>;
}

#[derive(Clone, Debug)]
pub struct HttpKeySource {
    client: reqwest::Client,
    jwks_uri: String,
}

impl HttpKeySource {
    pub fn new(client: reqwest::Client, jwks_uri: impl Into<String>) -> Self {
        Self {
            client,
            jwks_uri: jwks_uri.into(),
        }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))
    }
}

/// Immutable snapshot: key id -> verification key.
pub struct SigningKeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl SigningKeySet {
    fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.as_deref() else {
                tracing::debug!("skipping signing key without kid");
                continue;
            };
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid.to_string(), key);
                }
                Err(err) => tracing::warn!(kid, error = %err, "skipping unusable signing key"),
            }
        }

        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeySetPolicy {
    /// Age after which the snapshot is refreshed in the background.
    pub ttl: Duration,
    /// Upper bound a request waits for a refresh-on-miss.
    pub refresh_timeout: Duration,
    /// Minimum spacing between fetches triggered by unknown key ids.
    pub min_refresh_interval: Duration,
}

pub struct KeySetCache {
    source: Arc<dyn KeySource>,
    policy: KeySetPolicy,
    current: RwLock<Arc<SigningKeySet>>,
    refresh_lock: tokio::sync::Mutex<()>,
    last_attempt: Mutex<Option<Instant>>,
}

impl KeySetCache {
    /// Fetch the initial key set. Fails if the provider is unreachable or has no keys.
    pub async fn connect(
        source: Arc<dyn KeySource>,
        policy: KeySetPolicy,
    ) -> Result<Arc<Self>, KeySetError> {
        let jwks = tokio::time::timeout(policy.refresh_timeout, source.fetch())
            .await
            .map_err(|_| KeySetError::Timeout)??;

        let initial = SigningKeySet::from_jwks(&jwks);
        if initial.is_empty() {
            return Err(KeySetError::Empty);
        }
        tracing::info!(keys = initial.len(), "signing key set loaded");

        Ok(Arc::new(Self {
            source,
            policy,
            current: RwLock::new(Arc::new(initial)),
            refresh_lock: tokio::sync::Mutex::new(()),
            last_attempt: Mutex::new(Some(Instant::now())),
        }))
    }

    /// Cache around an already-installed snapshot, with no initial fetch.
    #[cfg(test)]
    pub(crate) fn from_parts(
        source: Arc<dyn KeySource>,
        current: Arc<SigningKeySet>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            source,
            policy: KeySetPolicy {
                ttl: Duration::from_secs(300),
                refresh_timeout,
                min_refresh_interval: Duration::ZERO,
            },
            current: RwLock::new(current),
            refresh_lock: tokio::sync::Mutex::new(()),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Arc<SigningKeySet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve `kid` to a verification key, refreshing at most once on a miss.
    pub async fn resolve(self: &Arc<Self>, kid: &str) -> Result<DecodingKey, KeyLookupError> {
        let snapshot = self.snapshot();
        if snapshot.is_stale(self.policy.ttl) {
            self.spawn_background_refresh();
        }
        if let Some(key) = snapshot.get(kid) {
            return Ok(key.clone());
        }

        match tokio::time::timeout(self.policy.refresh_timeout, self.refresh_on_miss(&snapshot))
            .await
        {
            Err(_) => {
                tracing::warn!(kid, "signing key refresh timed out");
                Err(KeyLookupError::Timeout)
            }
            Ok(Err(err)) => {
                tracing::warn!(kid, error = %err, "signing key refresh failed");
                self.snapshot().get(kid).cloned().ok_or(KeyLookupError::Unknown)
            }
            Ok(Ok(())) => self.snapshot().get(kid).cloned().ok_or(KeyLookupError::Unknown),
        }
    }

    /// Unconditional refresh (scheduled task).
    pub async fn refresh(&self) -> Result<usize, KeySetError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Keep the key set fresh every `ttl` until the cache is dropped.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.policy.ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let outcome =
                    tokio::time::timeout(cache.policy.refresh_timeout, cache.refresh()).await;
                match outcome {
                    Ok(Ok(keys)) => tracing::debug!(keys, "scheduled key set refresh"),
                    Ok(Err(err)) => tracing::warn!(error = %err, "scheduled key set refresh failed"),
                    Err(_) => tracing::warn!("scheduled key set refresh timed out"),
                }
            }
        })
    }

    fn spawn_background_refresh(self: &Arc<Self>) {
        // Someone is already refreshing.
        if self.refresh_lock.try_lock().is_err() {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let before = cache.snapshot();
            let outcome =
                tokio::time::timeout(cache.policy.refresh_timeout, cache.refresh_on_miss(&before))
                    .await;
            match outcome {
                Ok(Ok(())) => tracing::debug!("stale key set refreshed"),
                Ok(Err(err)) => tracing::warn!(error = %err, "stale key set refresh failed"),
                Err(_) => tracing::warn!("stale key set refresh timed out"),
            }
        });
    }

    async fn refresh_on_miss(&self, seen: &Arc<SigningKeySet>) -> Result<(), KeySetError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request installed a new set while we waited.
        if !Arc::ptr_eq(seen, &self.snapshot()) {
            return Ok(());
        }

        let due = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none_or(|at| at.elapsed() >= self.policy.min_refresh_interval);
        if !due {
            return Ok(());
        }

        self.refresh_locked().await.map(|_| ())
    }

    async fn refresh_locked(&self) -> Result<usize, KeySetError> {
        *self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        let jwks = self.source.fetch().await?;
        let next = SigningKeySet::from_jwks(&jwks);
        if next.is_empty() {
            return Err(KeySetError::Empty);
        }

        let count = next.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(count)
    }
}
