use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::cache::keys::user_keys::{user_id_key, username_key};
use crate::cache::models::user::CachedUser;
use crate::cache::store::CacheStore;
use crate::database::models::user::User;
use crate::error::CacheError;

/// 用户缓存的默认过期时间（30分钟）
pub const USER_CACHE_EXPIRE: Duration = Duration::from_secs(30 * 60);

/// 用户缓存操作
///
/// 同一份用户数据按ID和用户名各存一份，过期时间相互独立，命中时只刷新被命中的那个键。
/// 缓存不是权威数据，未命中时由调用方回源到持久化存储。
pub struct UserCache {
    pub(crate) cache: Arc<dyn CacheStore>,
    ttl: Duration,
    pub(crate) span: Span,
}

impl UserCache {
    /// 创建新的用户缓存操作实例
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            span: tracing::info_span!("user_cache"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 缓存用户信息
    ///
    /// 两个键都会尝试写入，任意一个失败就返回第一个错误，不回滚另一个。
    pub async fn cache_user(&self, user: &User) -> Result<(), CacheError> {
        let json = serde_json::to_vec(&CachedUser::from(user))?;

        let by_id = self.cache.set(&user_id_key(user.id), &json, self.ttl).await;
        let by_username = self
            .cache
            .set(&username_key(&user.username), &json, self.ttl)
            .await;

        by_id.and(by_username)
    }

    /// 根据用户ID获取用户，未命中返回 `None`
    pub async fn get_by_id(&self, id: u64) -> Result<Option<User>, CacheError> {
        self.fetch(&user_id_key(id)).await
    }

    /// 根据用户名获取用户，未命中返回 `None`
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, CacheError> {
        self.fetch(&username_key(username)).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<User>, CacheError> {
        let Some(bytes) = self.cache.get(key).await? else {
            return Ok(None);
        };

        let cached: CachedUser = serde_json::from_slice(&bytes)?;

        // 刷新过期时间
        if let Err(e) = self.cache.expire(key, self.ttl).await {
            tracing::warn!(parent: &self.span, key, error = %e, "刷新用户缓存过期时间失败");
        }

        Ok(Some(cached.into()))
    }
}
