use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::user::User;

/// 用户缓存数据模型
///
/// 与对外的 [`UserInfo`](crate::database::models::user::UserInfo) 不同，
/// 缓存副本保留密码哈希，登录命中缓存时要用它校验密码。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedUser {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<CachedUser> for User {
    fn from(cached: CachedUser) -> Self {
        Self {
            id: cached.id,
            username: cached.username,
            email: cached.email,
            password_hash: cached.password_hash,
            created_at: cached.created_at,
            updated_at: cached.updated_at,
        }
    }
}
