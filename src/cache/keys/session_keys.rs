/// 会话缓存键前缀
const SESSION_PREFIX: &str = "session:";

/// 用户会话索引键前缀
const USER_SESSIONS_PREFIX: &str = "user_sessions:";

/// 生成会话缓存键
pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

/// 生成用户会话ID集合的键
pub fn user_sessions_key(user_id: u64) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}
