use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// 缓存存储能力接口
///
/// 每个操作只保证单键原子性，不提供跨键事务。
/// 实现需要对外暴露超时错误（[`CacheError::Timeout`]），不能无限阻塞。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 写入并设置过期时间
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// 仅当键仍然存在时覆盖写入，返回是否写入成功
    async fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError>;

    /// 读取，未命中返回 `None`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// 重置过期时间，键不存在时什么也不做
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), CacheError>;

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError>;
}
