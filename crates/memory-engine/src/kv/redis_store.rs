use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tracing::info;

use crate::services::memory::providers::KeyValueStore;
use crate::utils::error::MemoryError;

/// Redis-backed key-value store.
/// `ConnectionManager` reconnects transparently and is cheap to clone per call.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Connected to Redis at {}", url);
        Ok(Self { conn })
    }
}

fn seconds(ttl: u64) -> i64 {
    i64::try_from(ttl).unwrap_or(i64::MAX)
}

#[async_trait]
impl KeyValueStore for RedisKvStore {
    async fn hset_indexed(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_seconds: Option<u64>,
        index_key: &str,
    ) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        pipe.hset_multiple(key, fields).ignore();
        if let Some(ttl) = ttl_seconds {
            pipe.expire(key, seconds(ttl)).ignore();
        }
        pipe.sadd(index_key, key).ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, MemoryError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> =
            redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
        Ok(map)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds(ttl_seconds))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, MemoryError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_seconds {
            cmd.arg("EX").arg(seconds(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
