// 缓存模块
// 包含缓存存储接口、缓存数据结构和操作逻辑

pub mod keys;
pub mod models;
pub mod operations;
pub mod redis_store;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod memory_store;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型，方便其他模块使用
#[cfg(any(test, feature = "mocks"))]
pub use memory_store::{CacheStats, MemoryCacheStore};
pub use models::{CachedUser, SessionData};
pub use operations::UserCache;
pub use redis_store::RedisCacheStore;
pub use store::CacheStore;
