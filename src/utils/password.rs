use async_trait::async_trait;
use bcrypt::DEFAULT_COST;

use crate::error::HashError;

/// 单向密码哈希能力
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plain: &str) -> Result<String, HashError>;

    /// 密码不匹配或哈希格式损坏都返回 false
    async fn verify(&self, plain: &str, hash: &str) -> bool;
}

/// bcrypt 实现，计算放在阻塞线程池里执行
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    async fn hash(&self, plain: &str) -> Result<String, HashError> {
        let plain = plain.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plain.as_bytes(), cost))
            .await
            .map_err(|e| HashError(e.to_string()))?
            .map_err(HashError::from)
    }

    async fn verify(&self, plain: &str, hash: &str) -> bool {
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || bcrypt::verify(plain.as_bytes(), &hash)).await {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "password verification task failed");
                false
            }
        }
    }
}
