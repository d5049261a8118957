use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少环境变量 {0}")]
    Missing(&'static str),
    #[error("环境变量 {name} 的值无效: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub session_ttl_secs: u64,
    pub user_cache_ttl_secs: u64,
    pub token_cache_ttl_secs: u64,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub cache_op_timeout_ms: u64,
    pub database_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源读取配置，未设置的可选项取默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str, default: &str| {
            lookup(name).unwrap_or_else(|| default.to_owned())
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: parse("SERVER_PORT", optional("SERVER_PORT", "8080"))?,
            api_base_uri: optional("API_BASE_URI", "/api"),
            session_ttl_secs: parse_hours("SESSION_TTL", optional("SESSION_TTL", "24h"))?,
            user_cache_ttl_secs: parse("USER_CACHE_TTL_SECS", optional("USER_CACHE_TTL_SECS", "1800"))?,
            token_cache_ttl_secs: parse_hours("TOKEN_CACHE_TTL", optional("TOKEN_CACHE_TTL", "24h"))?,
            session_cookie_name: optional("SESSION_COOKIE_NAME", "session_id"),
            session_cookie_secure: parse("SESSION_COOKIE_SECURE", optional("SESSION_COOKIE_SECURE", "false"))?,
            cache_op_timeout_ms: parse("CACHE_OP_TIMEOUT_MS", optional("CACHE_OP_TIMEOUT_MS", "2000"))?,
            database_max_connections: parse(
                "DATABASE_MAX_CONNECTIONS",
                optional("DATABASE_MAX_CONNECTIONS", "10"),
            )?,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn user_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.user_cache_ttl_secs)
    }

    pub fn token_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token_cache_ttl_secs)
    }

    pub fn cache_op_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_op_timeout_ms)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

/// 时长类配置的上限（十年）
const MAX_HOURS: u64 = 10 * 365 * 24;

/// 小时数，`h` 后缀可选，返回秒数
fn parse_hours(name: &'static str, value: String) -> Result<u64, ConfigError> {
    let secs = value
        .trim()
        .trim_end_matches('h')
        .parse::<u64>()
        .ok()
        .filter(|hours| (1..=MAX_HOURS).contains(hours))
        .and_then(|hours| hours.checked_mul(3600));

    secs.ok_or(ConfigError::Invalid { name, value })
}
