use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// A deny-list of session token IDs.
///
/// Entries only need to live until the token would have expired anyway.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Revokes the token `jti` until `until`.
    async fn revoke(&self, jti: Uuid, until: DateTime<Utc>) -> Result<()>;

    /// Whether the token `jti` has been revoked.
    async fn is_revoked(&self, jti: Uuid) -> Result<bool>;
}

/// A `RevocationStore` kept in Redis, shared by every server instance.
#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: ConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(jti: Uuid) -> String {
        format!("revoked:{}", jti)
    }
}

/// Seconds a deny-list entry must live to outlast a token expiring at `until`.
///
/// Rounds up, so the entry never expires before the token does. `None` means
/// the token has already expired and needs no entry.
fn revocation_ttl_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        return None;
    }
    Some((millis as u64).div_ceil(1000))
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: Uuid, until: DateTime<Utc>) -> Result<()> {
        let Some(remaining) = revocation_ttl_secs(until, Utc::now()) else {
            return Ok(());
        };

        let mut redis = self.redis.clone();
        let _: () = redis
            .set_ex(Self::key(jti), 1u8, remaining)
            .await
            .map_err(|e| {
                tracing::error!("Redis set_ex failed for revocation: {}", e);
                e
            })?;

        tracing::debug!("Session {} revoked in Redis for {}s", jti, remaining);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool> {
        let mut redis = self.redis.clone();
        let revoked: bool = redis.exists(Self::key(jti)).await?;
        Ok(revoked)
    }
}

/// A `RevocationStore` local to this process.
///
/// Used when no Redis is configured. Expired entries are purged on every
/// revocation, so the map never outgrows the set of live revoked tokens.
#[derive(Clone, Default)]
pub struct MemoryRevocationStore {
    revoked: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.revoked.read().await.len()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, jti: Uuid, until: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, expires| *expires > now);
        if until > now {
            revoked.insert(jti, until);
        }
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool> {
        let revoked = self.revoked.read().await;
        Ok(revoked
            .get(&jti)
            .is_some_and(|expires| *expires > Utc::now()))
    }
}
