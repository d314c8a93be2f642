//! Two-tier search result cache.
//!
//! The local tier is a cost-bounded in-process cache (weight = serialized
//! payload size) with TinyLFU admission, the optional remote tier is Redis
//! shared across instances. Both tiers hold the same JSON bytes under the
//! same TTL. A [`TieredCache`] can also be built disabled, in which case
//! every get is a miss and every set a no-op; callers never branch on
//! whether caching is configured.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use moka::sync::Cache as LocalCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CacheConfig;

/// A failed cache lookup. Callers treat this as a bypass, not a request
/// failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("remote cache error: {0}")]
    Remote(#[from] redis::RedisError),
    #[error("cached payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Cheaply cloneable cache handle shared across workers.
#[derive(Clone)]
pub struct TieredCache {
    inner: Option<Arc<CacheInner>>,
}

struct CacheInner {
    local: LocalCache<String, Arc<[u8]>>,
    remote: Option<ConnectionManager>,
    ttl: Duration,
}

impl TieredCache {
    /// A cache that is switched off.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Builds the cache from config. A zero cost bound or TTL is a
    /// configuration error; an unreachable Redis is not — the cache
    /// degrades to local-only with a warning.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        if config.max_cost == 0 {
            bail!("cache.max_cost must be positive");
        }
        if config.ttl_secs == 0 {
            bail!("cache.ttl_secs must be positive");
        }
        let ttl = Duration::from_secs(config.ttl_secs);

        let local = LocalCache::builder()
            .max_capacity(config.max_cost)
            .weigher(|_key: &String, value: &Arc<[u8]>| {
                value.len().try_into().unwrap_or(u32::MAX)
            })
            .time_to_live(ttl)
            .build();

        let remote = match &config.redis_url {
            Some(url) => match connect_redis(url).await {
                Ok(conn) => Some(conn),
                Err(err) => {
                    warn!(error = %err, "redis unreachable, cache degrades to local tier only");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            inner: Some(Arc::new(CacheInner { local, remote, ttl })),
        })
    }

    /// Looks a key up, local tier first. A remote hit backfills the local
    /// tier with the same TTL. Remote errors and undecodable payloads come
    /// back as `Err`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };

        if let Some(bytes) = inner.local.get(key) {
            debug!(key, "cache hit (local)");
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }

        let Some(remote) = &inner.remote else {
            return Ok(None);
        };
        let mut conn = remote.clone();
        let bytes: Option<Vec<u8>> = conn.get(key).await?;
        match bytes {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                inner
                    .local
                    .insert(key.to_string(), Arc::from(bytes.into_boxed_slice()));
                debug!(key, "cache hit (remote)");
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Stores a value in both tiers. Serialization problems and remote
    /// write failures are logged and swallowed; the local write happens
    /// regardless, so the fast tier never depends on Redis health.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(inner) = &self.inner else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize cache payload");
                return;
            }
        };

        if let Some(remote) = &inner.remote {
            let mut conn = remote.clone();
            let written: Result<(), redis::RedisError> = conn
                .set_ex(key, bytes.as_slice(), inner.ttl.as_secs())
                .await;
            if let Err(err) = written {
                warn!(key, error = %err, "failed to write remote cache");
            }
        }

        inner
            .local
            .insert(key.to_string(), Arc::from(bytes.into_boxed_slice()));
    }
}

async fn connect_redis(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(url)?;
    let mut conn = ConnectionManager::new(client).await?;
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_only(max_cost: u64, ttl_secs: u64) -> CacheConfig {
        CacheConfig {
            max_cost,
            ttl_secs,
            redis_url: None,
        }
    }

    #[tokio::test]
    async fn disabled_cache_is_a_permanent_miss() {
        let cache = TieredCache::disabled();
        assert!(!cache.is_enabled());
        cache.set("k", &vec![1, 2, 3]).await;
        let got: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn local_tier_roundtrips_typed_payloads() {
        let cache = TieredCache::connect(&local_only(1 << 20, 60)).await.unwrap();
        assert!(cache.is_enabled());

        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Payload {
            total: i64,
            names: Vec<String>,
        }
        let value = Payload {
            total: 7,
            names: vec!["caneta".to_string()],
        };
        cache.set("catmat:search:x", &value).await;
        let got: Option<Payload> = cache.get("catmat:search:x").await.unwrap();
        assert_eq!(got, Some(value));
    }

    #[tokio::test]
    async fn unknown_key_is_a_miss_not_an_error() {
        let cache = TieredCache::connect(&local_only(1 << 20, 60)).await.unwrap();
        let got: Option<String> = cache.get("nope").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn zero_cost_bound_is_rejected_at_construction() {
        assert!(TieredCache::connect(&local_only(0, 60)).await.is_err());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected_at_construction() {
        assert!(TieredCache::connect(&local_only(1 << 20, 0)).await.is_err());
    }
}
