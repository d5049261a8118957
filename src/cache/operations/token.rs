use std::time::Duration;

use crate::cache::keys::user_keys::user_token_key;
use crate::cache::operations::user::UserCache;
use crate::error::CacheError;

/// 用户最近签发令牌的缓存，仅用于查询与观测，不参与会话校验
impl UserCache {
    /// 缓存令牌
    pub async fn cache_token(
        &self,
        user_id: u64,
        token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.cache
            .set(&user_token_key(user_id), token.as_bytes(), ttl)
            .await
    }

    /// 获取用户令牌，未命中返回 `None`
    pub async fn get_token(&self, user_id: u64) -> Result<Option<String>, CacheError> {
        match self.cache.get(&user_token_key(user_id)).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| CacheError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    /// 删除用户令牌缓存
    pub async fn delete_token(&self, user_id: u64) -> Result<(), CacheError> {
        tracing::debug!(parent: &self.span, user_id, "删除令牌缓存");
        self.cache.delete(&user_token_key(user_id)).await
    }
}
