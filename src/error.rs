use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::ApiResult;

/// 缓存存储错误，调用方可重试
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("缓存后端错误: {0}")]
    Backend(String),
    #[error("缓存操作超时")]
    Timeout,
    #[error("缓存数据序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("记录不存在")]
    NotFound,
    #[error("唯一约束冲突: {0}")]
    Duplicate(String),
    #[error("数据库错误: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(db.constraint().unwrap_or("unique").to_string())
            }
            other => StoreError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("密码哈希失败: {0}")]
pub struct HashError(pub String);

impl From<bcrypt::BcryptError> for HashError {
    fn from(e: bcrypt::BcryptError) -> Self {
        HashError(e.to_string())
    }
}

/// 会话管理器错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话不存在或已过期
    #[error("会话不存在或已过期")]
    NotFound,
    #[error("无法生成会话ID: {0}")]
    TokenGeneration(String),
    #[error("创建会话失败: {0}")]
    Creation(#[source] CacheError),
    #[error("获取会话数据失败: {0}")]
    Lookup(#[source] CacheError),
    #[error("会话存储错误: {0}")]
    Storage(#[source] CacheError),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound)
    }
}

/// 认证服务错误。预期内的拒绝（重复注册、凭证错误、用户不存在）通过结果结构返回，不走这里
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// HTTP 层错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error("请求参数错误: {0}")]
    Validation(String),
    #[error("未提供认证信息")]
    MissingCredentials,
    #[error("会话无效或已过期")]
    Unauthorized,
    #[error("用户不存在")]
    NotFound,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => AppError::Unauthorized,
            other => AppError::Auth(AuthError::Session(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MissingCredentials => (StatusCode::UNAUTHORIZED, "未提供认证信息".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "会话无效或已过期".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "用户不存在".to_string()),
            AppError::Auth(e) => {
                // 内部错误细节只写日志，不返回给客户端
                tracing::error!(error = %e, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "服务器内部错误".to_string(),
                )
            }
        };

        let body = Json(ApiResult::<()>::error(&message));

        (status, body).into_response()
    }
}
