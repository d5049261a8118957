use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::Span;

use crate::cache::operations::UserCache;
use crate::database::models::user::{NewUser, User, UserInfo};
use crate::database::repositories::user::UserStore;
use crate::error::{AuthError, SessionError, StoreError};
use crate::session::{SessionData, SessionManager};
use crate::utils::PasswordHasher;

const MSG_USERNAME_TAKEN: &str = "用户名已存在";
const MSG_EMAIL_TAKEN: &str = "邮箱已被注册";
const MSG_REGISTERED: &str = "注册成功";
// 用户不存在与密码错误共用同一条消息，不暴露用户名是否存在
const MSG_INVALID_CREDENTIALS: &str = "用户名或密码错误";
const MSG_LOGGED_IN: &str = "登录成功";
const MSG_USER_NOT_FOUND: &str = "用户不存在";
const MSG_USER_FOUND: &str = "获取用户信息成功";

#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl RegisterOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_owned(),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

impl LoginOutcome {
    fn invalid_credentials() -> Self {
        Self {
            success: false,
            message: MSG_INVALID_CREDENTIALS.to_owned(),
            token: None,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfoOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// 用户服务
///
/// 读路径先查缓存，未命中或缓存故障时回源持久化存储并回填缓存；
/// 写路径以持久化存储为准，缓存写入失败只记录日志。
pub struct UserService {
    store: Arc<dyn UserStore>,
    users: UserCache,
    sessions: Arc<SessionManager>,
    hasher: Arc<dyn PasswordHasher>,
    token_ttl: Duration,
    span: Span,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        users: UserCache,
        sessions: Arc<SessionManager>,
        hasher: Arc<dyn PasswordHasher>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            users,
            sessions,
            hasher,
            token_ttl,
            span: tracing::info_span!("user_service"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 注册新用户
    ///
    /// 先查用户名再查邮箱，都不冲突才计算密码哈希。
    /// 并发注册时唯一约束冲突同样按重复处理。
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, AuthError> {
        let start = Instant::now();

        if self.store.exists_username(username).await? {
            tracing::info!(parent: &self.span, username, "注册被拒绝：用户名已存在");
            return Ok(RegisterOutcome::rejected(MSG_USERNAME_TAKEN));
        }
        if self.store.exists_email(email).await? {
            tracing::info!(parent: &self.span, username, "注册被拒绝：邮箱已被注册");
            return Ok(RegisterOutcome::rejected(MSG_EMAIL_TAKEN));
        }

        let password_hash = self.hasher.hash(password).await?;
        let new_user = NewUser::new(username, email, password_hash);

        let user_id = match self.store.create(&new_user).await {
            Ok(id) => id,
            Err(StoreError::Duplicate(constraint)) => {
                tracing::info!(parent: &self.span, username, constraint = %constraint, "并发注册触发唯一约束");
                let message = if constraint.contains("email") {
                    MSG_EMAIL_TAKEN
                } else {
                    MSG_USERNAME_TAKEN
                };
                return Ok(RegisterOutcome::rejected(message));
            }
            Err(e) => {
                tracing::error!(parent: &self.span, username, error = %e, "保存用户失败");
                return Err(e.into());
            }
        };

        let user = new_user.into_user(user_id);
        if let Err(e) = self.users.cache_user(&user).await {
            tracing::warn!(parent: &self.span, user_id, error = %e, "缓存新用户失败");
        }

        tracing::info!(
            parent: &self.span,
            user_id,
            username,
            duration_ms = start.elapsed().as_millis() as u64,
            "用户注册成功"
        );

        Ok(RegisterOutcome {
            success: true,
            message: MSG_REGISTERED.to_owned(),
            user_id: Some(user_id),
        })
    }

    /// 用户名密码登录，成功时创建会话并返回会话令牌
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let start = Instant::now();

        let cached = match self.users.get_by_username(username).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(parent: &self.span, username, error = %e, "用户缓存不可用，回源数据库");
                None
            }
        };

        let user = match cached {
            Some(user) => user,
            None => match self.store.find_by_username(username).await {
                Ok(user) => {
                    self.populate(&user).await;
                    user
                }
                Err(StoreError::NotFound) => {
                    tracing::info!(parent: &self.span, username, "登录失败：用户不存在");
                    return Ok(LoginOutcome::invalid_credentials());
                }
                Err(e) => {
                    tracing::error!(parent: &self.span, username, error = %e, "登录时查询用户失败");
                    return Err(e.into());
                }
            },
        };

        if !self.hasher.verify(password, &user.password_hash).await {
            tracing::info!(parent: &self.span, user_id = user.id, "登录失败：密码错误");
            return Ok(LoginOutcome::invalid_credentials());
        }

        let token = self
            .sessions
            .create_session(user.id, &user.username, Some(&user.email))
            .await?;

        if let Err(e) = self.users.cache_token(user.id, &token, self.token_ttl).await {
            tracing::warn!(parent: &self.span, user_id = user.id, error = %e, "缓存登录令牌失败");
        }

        tracing::info!(
            parent: &self.span,
            user_id = user.id,
            username = %user.username,
            duration_ms = start.elapsed().as_millis() as u64,
            "用户登录成功"
        );

        Ok(LoginOutcome {
            success: true,
            message: MSG_LOGGED_IN.to_owned(),
            token: Some(token),
            user: Some(UserInfo::from(&user)),
        })
    }

    /// 按ID获取用户信息
    pub async fn get_user_info(&self, user_id: u64) -> Result<UserInfoOutcome, AuthError> {
        let cached = match self.users.get_by_id(user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(parent: &self.span, user_id, error = %e, "用户缓存不可用，回源数据库");
                None
            }
        };

        let user = match cached {
            Some(user) => user,
            None => match self.store.find_by_id(user_id).await {
                Ok(user) => {
                    self.populate(&user).await;
                    user
                }
                Err(StoreError::NotFound) => {
                    tracing::debug!(parent: &self.span, user_id, "用户不存在");
                    return Ok(UserInfoOutcome {
                        success: false,
                        message: MSG_USER_NOT_FOUND.to_owned(),
                        user: None,
                    });
                }
                Err(e) => {
                    tracing::error!(parent: &self.span, user_id, error = %e, "查询用户失败");
                    return Err(e.into());
                }
            },
        };

        Ok(UserInfoOutcome {
            success: true,
            message: MSG_USER_FOUND.to_owned(),
            user: Some(UserInfo::from(&user)),
        })
    }

    /// 校验会话并返回会话数据，同时滑动续期
    pub async fn authenticate(&self, session_id: &str) -> Result<SessionData, SessionError> {
        self.sessions.get_session(session_id).await
    }

    /// 登出当前会话，会话不存在时也视为成功
    pub async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        let owner = self.sessions.destroy_session(session_id).await?;

        if let Some(user_id) = owner {
            self.forget_token(user_id, Some(session_id)).await;
            tracing::info!(parent: &self.span, user_id, "用户已登出");
        }
        Ok(())
    }

    /// 吊销用户的全部会话，返回被删除的会话数
    pub async fn logout_all(&self, user_id: u64) -> Result<usize, AuthError> {
        let revoked = self.sessions.destroy_all_user_sessions(user_id).await?;
        self.forget_token(user_id, None).await;

        tracing::info!(parent: &self.span, user_id, revoked, "已吊销用户全部会话");
        Ok(revoked)
    }

    async fn populate(&self, user: &User) {
        if let Err(e) = self.users.cache_user(user).await {
            tracing::warn!(parent: &self.span, user_id = user.id, error = %e, "回填用户缓存失败");
        }
    }

    /// 删除最近令牌缓存；给定 `only_if` 时仅当缓存的正是该令牌才删除
    async fn forget_token(&self, user_id: u64, only_if: Option<&str>) {
        if let Some(expected) = only_if {
            match self.users.get_token(user_id).await {
                Ok(Some(token)) if token == expected => {}
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!(parent: &self.span, user_id, error = %e, "读取令牌缓存失败");
                    return;
                }
            }
        }

        if let Err(e) = self.users.delete_token(user_id).await {
            tracing::warn!(parent: &self.span, user_id, error = %e, "删除令牌缓存失败");
        }
    }
}
