use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话缓存数据模型
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub session_id: String,
    pub user_id: u64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl SessionData {
    /// 内容层面的过期判断，与缓存键自身的TTL相互独立
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}
