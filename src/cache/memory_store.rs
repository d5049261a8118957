use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::store::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// 进程内缓存存储，过期时间由注入的时钟驱动
///
/// 记录读命中/未命中次数，测试里用来观察缓存是否生效。
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// 读操作统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// 键是否存在且未过期
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        entries.get(key).is_some_and(|e| !is_expired(e, now))
    }

    /// 未过期的键数量
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        entries.values().filter(|e| !is_expired(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 剩余存活时间
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|e| !is_expired(e, now))
            .and_then(|e| e.expires_at)
            .and_then(|at| (at - now).to_std().ok())
    }

    /// 超出时间范围的TTL视为永不过期
    fn deadline(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
    }

    /// 在锁内清理过期键后执行操作
    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, e| !is_expired(e, now));
        f(&mut entries)
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(entry: &Entry, now: DateTime<Utc>) -> bool {
    entry.expires_at.is_some_and(|at| at <= now)
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!("WRONGTYPE operation against key {key}"))
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.deadline(ttl);
        self.with_entries(|entries| {
            entries.insert(
                key.to_owned(),
                Entry {
                    value: Value::Bytes(value.to_vec()),
                    expires_at,
                },
            );
        });
        Ok(())
    }

    async fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let expires_at = self.deadline(ttl);
        Ok(self.with_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.value = Value::Bytes(value.to_vec());
                entry.expires_at = expires_at;
                true
            }
            None => false,
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let found = self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        })?;

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.deadline(ttl);
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = expires_at;
            }
        });
        Ok(())
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            let entry = entries.entry(set_key.to_owned()).or_insert_with(|| Entry {
                value: Value::Set(BTreeSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(members) => {
                    members.insert(member.to_owned());
                    Ok(())
                }
                Value::Bytes(_) => Err(wrong_type(set_key)),
            }
        })
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            let emptied = match entries.get_mut(set_key) {
                Some(Entry {
                    value: Value::Set(members),
                    ..
                }) => {
                    members.remove(member);
                    members.is_empty()
                }
                Some(_) => return Err(wrong_type(set_key)),
                None => false,
            };
            // 与 Redis 一致，空集合即删除
            if emptied {
                entries.remove(set_key);
            }
            Ok(())
        })
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        self.with_entries(|entries| match entries.get(set_key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(set_key)),
            None => Ok(Vec::new()),
        })
    }
}
