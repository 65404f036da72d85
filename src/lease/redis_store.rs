//! Redis-backed lease store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::redis::RedisPool;

use super::{LeaseError, LeaseStore};

/// Redis-backed lease store.
///
/// Acquisition is `SET NX PX`; renewal and release are Lua scripts that
/// compare the stored owner token before touching the key, so a lease taken
/// over after expiry cannot be extended or deleted by its previous holder.
pub struct RedisLeaseStore {
    pool: Arc<RedisPool>,
}

const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

impl RedisLeaseStore {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    fn lease_key(&self, lock_id: &str) -> String {
        format!("{}:lease:{}", self.pool.key_prefix(), lock_id)
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn try_acquire(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError> {
        let key = self.lease_key(lock_id);
        let owner = owner.to_string();
        let ttl_ms = max_age.as_millis() as u64;

        let reply: Option<String> = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&owner)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(reply.is_some())
    }

    async fn renew(
        &self,
        lock_id: &str,
        owner: &str,
        max_age: Duration,
    ) -> Result<bool, LeaseError> {
        let key = self.lease_key(lock_id);
        let owner = owner.to_string();
        let ttl_ms = max_age.as_millis() as u64;

        let renewed: i32 = self
            .pool
            .execute(|mut conn| async move {
                redis::Script::new(RENEW_SCRIPT)
                    .key(&key)
                    .arg(&owner)
                    .arg(ttl_ms)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(renewed == 1)
    }

    async fn release(&self, lock_id: &str, owner: &str) -> Result<(), LeaseError> {
        let key = self.lease_key(lock_id);
        let owner = owner.to_string();

        let _: i32 = self
            .pool
            .execute(|mut conn| async move {
                redis::Script::new(RELEASE_SCRIPT)
                    .key(&key)
                    .arg(&owner)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(())
    }
}
