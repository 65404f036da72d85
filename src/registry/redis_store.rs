//! Redis-backed registry store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::redis::RedisPool;

use super::types::{Connection, RegistryError, ScanCursor, ScanPage};
use super::RegistryStore;

/// Redis-backed registry store.
///
/// Rows are JSON values under `{prefix}:conn:{identity}`; pagination maps
/// directly onto the `SCAN` cursor. `SCAN` guarantees every key present for
/// the whole pass is returned at least once, which is all the sweep needs.
pub struct RedisRegistryStore {
    pool: Arc<RedisPool>,
    page_size: usize,
}

impl RedisRegistryStore {
    pub fn new(pool: Arc<RedisPool>, page_size: usize) -> Self {
        Self {
            pool,
            page_size: page_size.max(1),
        }
    }

    fn conn_key(&self, identity: &str) -> String {
        format!("{}:conn:{}", self.pool.key_prefix(), identity)
    }

    fn match_pattern(&self) -> String {
        format!("{}:conn:*", self.pool.key_prefix())
    }
}

#[async_trait]
impl RegistryStore for RedisRegistryStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, identity: &str) -> Result<Option<Connection>, RegistryError> {
        let key = self.conn_key(identity);
        let raw: Option<String> = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("GET").arg(&key).query_async(&mut conn).await
            })
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, row: &Connection) -> Result<(), RegistryError> {
        let key = self.conn_key(&row.identity);
        let json = serde_json::to_string(row)?;
        let _: () = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&json)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), RegistryError> {
        let key = self.conn_key(identity);
        let _: () = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("DEL").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn scan(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, RegistryError> {
        let position: u64 = cursor
            .as_ref()
            .and_then(|c| c.0.parse().ok())
            .unwrap_or(0);
        let pattern = self.match_pattern();
        let page_size = self.page_size;

        let (next_position, keys): (u64, Vec<String>) = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("SCAN")
                    .arg(position)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(page_size)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        let mut rows = Vec::with_capacity(keys.len());
        if !keys.is_empty() {
            let mget_keys = keys.clone();
            let values: Vec<Option<String>> = self
                .pool
                .execute(|mut conn| async move {
                    redis::cmd("MGET")
                        .arg(&mget_keys)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            for (key, value) in keys.iter().zip(values) {
                // A key can vanish between SCAN and MGET
                let Some(json) = value else { continue };
                match serde_json::from_str::<Connection>(&json) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Skipping unreadable registry row");
                    }
                }
            }
        }

        let next = if next_position == 0 {
            None
        } else {
            Some(ScanCursor(next_position.to_string()))
        };

        Ok(ScanPage { rows, next })
    }
}
