/// 按ID缓存的用户信息键前缀
const USER_ID_PREFIX: &str = "user:id:";

/// 按用户名缓存的用户信息键前缀
const USERNAME_PREFIX: &str = "user:username:";

/// 用户最近签发令牌的键前缀
const USER_TOKEN_PREFIX: &str = "token:user:";

/// 生成按ID查询的用户缓存键
pub fn user_id_key(user_id: u64) -> String {
    format!("{}{}", USER_ID_PREFIX, user_id)
}

/// 生成按用户名查询的用户缓存键
pub fn username_key(username: &str) -> String {
    format!("{}{}", USERNAME_PREFIX, username)
}

/// 生成用户令牌缓存键
pub fn user_token_key(user_id: u64) -> String {
    format!("{}{}", USER_TOKEN_PREFIX, user_id)
}
