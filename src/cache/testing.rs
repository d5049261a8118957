use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::memory_store::MemoryCacheStore;
use crate::cache::store::CacheStore;
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Set,
    Replace,
    Get,
    Delete,
    Expire,
    SetAdd,
    SetRemove,
    SetMembers,
}

/// 按操作类型或按键注入故障的缓存包装
pub struct FlakyCacheStore {
    pub inner: Arc<MemoryCacheStore>,
    failing_ops: Mutex<HashSet<CacheOp>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl FlakyCacheStore {
    pub fn new(inner: Arc<MemoryCacheStore>) -> Self {
        Self {
            inner,
            failing_ops: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_op(&self, op: CacheOp) {
        self.failing_ops.lock().unwrap().insert(op);
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_owned());
    }

    pub fn heal(&self) {
        self.failing_ops.lock().unwrap().clear();
        self.failing_keys.lock().unwrap().clear();
    }

    fn check(&self, op: CacheOp, key: &str) -> Result<(), CacheError> {
        if self.failing_ops.lock().unwrap().contains(&op)
            || self.failing_keys.lock().unwrap().contains(key)
        {
            return Err(CacheError::Backend(format!("injected failure on {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.check(CacheOp::Set, key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        self.check(CacheOp::Replace, key)?;
        self.inner.replace(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check(CacheOp::Get, key)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check(CacheOp::Delete, key)?;
        self.inner.delete(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check(CacheOp::Expire, key)?;
        self.inner.expire(key, ttl).await
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.check(CacheOp::SetAdd, set_key)?;
        self.inner.set_add(set_key, member).await
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.check(CacheOp::SetRemove, set_key)?;
        self.inner.set_remove(set_key, member).await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        self.check(CacheOp::SetMembers, set_key)?;
        self.inner.set_members(set_key).await
    }
}
