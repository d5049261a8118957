use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::store::CacheStore;
use crate::error::CacheError;

/// 基于 Redis 的缓存存储
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl RedisCacheStore {
    /// 建立多路复用连接并做一次 PING 检查
    pub async fn connect(redis: &Arc<RedisClient>, op_timeout: Duration) -> Result<Self, CacheError> {
        let conn = match tokio::time::timeout(op_timeout, redis.get_multiplexed_async_connection()).await {
            Ok(conn) => conn?,
            Err(_) => return Err(CacheError::Timeout),
        };

        let store = Self { conn, op_timeout };
        store
            .bounded(|mut conn| async move {
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            })
            .await?;

        tracing::info!("成功连接到Redis服务器");
        Ok(store)
    }

    /// 每个命令都有超时上限，超时作为可重试的存储错误返回
    async fn bounded<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op(self.conn.clone())).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

/// Redis 的 EX 参数最小为 1 秒
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.bounded(|mut conn| async move { conn.set_ex(key, value, ttl_secs(ttl)).await })
            .await
    }

    async fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        // SET key value XX EX ttl，键不存在时返回 nil
        let reply: Option<String> = self
            .bounded(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("XX")
                    .arg("EX")
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.bounded(|mut conn| async move { conn.get(key).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.bounded(|mut conn| async move { conn.del(key).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.bounded(|mut conn| async move { conn.expire(key, ttl_secs(ttl) as i64).await })
            .await
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.bounded(|mut conn| async move { conn.sadd(set_key, member).await })
            .await
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.bounded(|mut conn| async move { conn.srem(set_key, member).await })
            .await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        self.bounded(|mut conn| async move { conn.smembers(set_key).await })
            .await
    }
}
