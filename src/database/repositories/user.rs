use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::user::{NewUser, User, UserRow};
use crate::error::StoreError;

/// 持久化用户存储能力接口
///
/// 查询不到记录时返回 [`StoreError::NotFound`]，与存储故障区分开。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 创建用户，返回分配的ID
    async fn create(&self, user: &NewUser) -> Result<u64, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn exists_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn exists_email(&self, email: &str) -> Result<bool, StoreError>;
}

/// 基于 Postgres 的用户存储库
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create(&self, user: &NewUser) -> Result<u64, StoreError> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (username, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => {
                tracing::debug!(user_id = id, username = %user.username, "Created user");
                Ok(id as u64)
            }
            Err(e) => {
                let err = StoreError::from(e);
                if !matches!(err, StoreError::Duplicate(_)) {
                    tracing::error!(username = %user.username, error = %err, "Failed to create user");
                }
                Err(err)
            }
        }
    }

    async fn find_by_id(&self, id: u64) -> Result<User, StoreError> {
        // 超出 BIGINT 范围的ID不可能存在
        let Ok(id) = i64::try_from(id) else {
            return Err(StoreError::NotFound);
        };

        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or(StoreError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or(StoreError::NotFound)
    }

    async fn exists_username(&self, username: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn exists_email(&self, email: &str) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}
