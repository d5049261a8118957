use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::Span;

use crate::cache::keys::{session_key, user_sessions_key};
use crate::cache::models::SessionData;
use crate::cache::store::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, SessionError};
use crate::session::token::generate_token;
use crate::utils::mask_token;

/// 会话管理器
///
/// 会话记录写在 `session:{token}`，同时把令牌登记到 `user_sessions:{user_id}`
/// 集合中以便批量吊销。集合的过期时间始终是会话的两倍，保证它比引用的会话活得更久。
///
/// 每次成功读取都会把 `expire_at` 推到 `now + ttl`（滑动过期）。
pub struct SessionManager {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    span: Span,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            cache,
            clock: Arc::new(SystemClock),
            ttl,
            span: tracing::info_span!("session_manager"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 替换日志上下文，本组件的所有日志事件都挂在这个 span 下
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn index_ttl(&self) -> Duration {
        self.ttl.saturating_mul(2)
    }

    fn expire_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 创建新会话，返回会话ID
    ///
    /// 索引写入失败时会尽力删除刚写入的会话，避免留下无法被批量吊销的会话。
    pub async fn create_session(
        &self,
        user_id: u64,
        username: &str,
        email: Option<&str>,
    ) -> Result<String, SessionError> {
        let session_id = generate_token()?;

        let now = self.clock.now();
        let session = SessionData {
            session_id: session_id.clone(),
            user_id,
            username: username.to_owned(),
            email: email.filter(|e| !e.is_empty()).map(str::to_owned),
            issued_at: now,
            expire_at: self.expire_at(now),
        };

        let json =
            serde_json::to_vec(&session).map_err(|e| SessionError::Creation(CacheError::from(e)))?;

        let key = session_key(&session_id);
        if let Err(e) = self.cache.set(&key, &json, self.ttl).await {
            tracing::warn!(parent: &self.span, user_id, error = %e, "保存会话失败");
            return Err(SessionError::Creation(e));
        }

        if let Err(e) = self.add_to_index(user_id, &session_id).await {
            tracing::warn!(parent: &self.span, user_id, error = %e, "保存会话索引失败，回滚会话");
            if let Err(del) = self.cache.delete(&key).await {
                tracing::warn!(
                    parent: &self.span,
                    user_id,
                    session = %mask_token(&session_id),
                    error = %del,
                    "回滚会话失败"
                );
            }
            // 登记可能已经写入，只是设置过期时间失败
            if let Err(rem) = self
                .cache
                .set_remove(&user_sessions_key(user_id), &session_id)
                .await
            {
                tracing::warn!(
                    parent: &self.span,
                    user_id,
                    session = %mask_token(&session_id),
                    error = %rem,
                    "回滚会话索引失败"
                );
            }
            return Err(SessionError::Creation(e));
        }

        tracing::info!(
            parent: &self.span,
            user_id,
            session = %mask_token(&session_id),
            "会话已创建"
        );
        Ok(session_id)
    }

    async fn add_to_index(&self, user_id: u64, session_id: &str) -> Result<(), CacheError> {
        let index_key = user_sessions_key(user_id);
        self.cache.set_add(&index_key, session_id).await?;
        self.cache.expire(&index_key, self.index_ttl()).await
    }

    /// 获取会话并滑动续期
    ///
    /// 内容已过期的会话视为不存在，同时被清理。
    pub async fn get_session(&self, session_id: &str) -> Result<SessionData, SessionError> {
        let key = session_key(session_id);
        let bytes = self
            .cache
            .get(&key)
            .await
            .map_err(SessionError::Lookup)?
            .ok_or(SessionError::NotFound)?;

        let mut session: SessionData = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Lookup(CacheError::from(e)))?;

        let now = self.clock.now();
        if session.is_expired_at(now) {
            tracing::debug!(
                parent: &self.span,
                user_id = session.user_id,
                session = %mask_token(session_id),
                "会话已过期"
            );
            if let Err(e) = self.destroy_session(session_id).await {
                tracing::warn!(parent: &self.span, error = %e, "清理过期会话失败");
            }
            return Err(SessionError::NotFound);
        }

        match self.touch(&key, &mut session, now).await {
            Ok(true) => {}
            // 读取之后被并发销毁
            Ok(false) => return Err(SessionError::NotFound),
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    user_id = session.user_id,
                    error = %e,
                    "刷新会话过期时间失败"
                );
            }
        }

        Ok(session)
    }

    /// 刷新会话过期时间，会话不存在时静默返回
    pub async fn refresh_session(&self, session_id: &str) -> Result<(), SessionError> {
        let key = session_key(session_id);
        let Some(bytes) = self.cache.get(&key).await.map_err(SessionError::Storage)? else {
            return Ok(());
        };

        let mut session: SessionData = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Storage(CacheError::from(e)))?;

        let now = self.clock.now();
        // 已过期的会话不能被续活
        if session.is_expired_at(now) {
            return Ok(());
        }

        self.touch(&key, &mut session, now)
            .await
            .map_err(SessionError::Storage)?;
        Ok(())
    }

    /// 更新 `expire_at` 并以“仅当键存在”方式写回，返回是否写入
    async fn touch(
        &self,
        key: &str,
        session: &mut SessionData,
        now: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        session.expire_at = self.expire_at(now);
        let json = serde_json::to_vec(session)?;

        if !self.cache.replace(key, &json, self.ttl).await? {
            return Ok(false);
        }

        // 索引跟随续期，保持两倍于会话的存活时间
        let index_key = user_sessions_key(session.user_id);
        if let Err(e) = self.cache.expire(&index_key, self.index_ttl()).await {
            tracing::warn!(
                parent: &self.span,
                user_id = session.user_id,
                error = %e,
                "刷新会话索引过期时间失败"
            );
        }
        Ok(true)
    }

    /// 销毁会话，返回会话所属的用户ID（读不到会话记录时为 `None`）
    ///
    /// 先尽力从用户索引中移除，再无条件删除会话键。对已销毁的会话调用是空操作。
    pub async fn destroy_session(&self, session_id: &str) -> Result<Option<u64>, SessionError> {
        let key = session_key(session_id);
        let mut owner = None;

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<SessionData>(&bytes) {
                Ok(session) => {
                    owner = Some(session.user_id);
                    let index_key = user_sessions_key(session.user_id);
                    if let Err(e) = self.cache.set_remove(&index_key, session_id).await {
                        tracing::warn!(
                            parent: &self.span,
                            user_id = session.user_id,
                            error = %e,
                            "从会话索引中移除失败"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, "解析会话数据失败");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "获取会话数据失败");
            }
        }

        self.cache.delete(&key).await.map_err(SessionError::Storage)?;
        tracing::debug!(parent: &self.span, session = %mask_token(session_id), "会话已销毁");
        Ok(owner)
    }

    /// 销毁用户的所有会话，返回删除的会话数
    ///
    /// 单个会话删除失败不会中断循环；只要有失败，索引就保留下来并返回错误，
    /// 调用方重试时仍能看到同一份索引。
    pub async fn destroy_all_user_sessions(&self, user_id: u64) -> Result<usize, SessionError> {
        let index_key = user_sessions_key(user_id);
        let session_ids = self
            .cache
            .set_members(&index_key)
            .await
            .map_err(SessionError::Storage)?;

        let results = join_all(session_ids.iter().map(|session_id| {
            let key = session_key(session_id);
            async move { self.cache.delete(&key).await }
        }))
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        for (session_id, result) in session_ids.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!(
                    parent: &self.span,
                    user_id,
                    session = %mask_token(session_id),
                    error = %e,
                    "删除会话失败"
                );
            }
        }

        if failed > 0 {
            return Err(SessionError::Storage(CacheError::Backend(format!(
                "{} 个会话删除失败",
                failed
            ))));
        }

        self.cache
            .delete(&index_key)
            .await
            .map_err(SessionError::Storage)?;

        tracing::info!(parent: &self.span, user_id, count = session_ids.len(), "已销毁用户的所有会话");
        Ok(session_ids.len())
    }

    /// 列出用户当前有效的会话，不触发续期
    ///
    /// 索引中已经失效的会话ID会被顺手移除。
    pub async fn list_user_sessions(&self, user_id: u64) -> Result<Vec<SessionData>, SessionError> {
        let index_key = user_sessions_key(user_id);
        let session_ids = self
            .cache
            .set_members(&index_key)
            .await
            .map_err(SessionError::Lookup)?;

        let now = self.clock.now();
        let mut sessions = Vec::with_capacity(session_ids.len());
        for session_id in session_ids {
            let bytes = self
                .cache
                .get(&session_key(&session_id))
                .await
                .map_err(SessionError::Lookup)?;

            let live = match bytes {
                Some(bytes) => serde_json::from_slice::<SessionData>(&bytes)
                    .ok()
                    .filter(|s| !s.is_expired_at(now)),
                None => None,
            };

            match live {
                Some(session) => sessions.push(session),
                None => {
                    if let Err(e) = self.cache.set_remove(&index_key, &session_id).await {
                        tracing::warn!(parent: &self.span, user_id, error = %e, "清理会话索引失败");
                    }
                }
            }
        }

        sessions.sort_by_key(|s| s.issued_at);
        Ok(sessions)
    }

    /// 会话是否有效
    pub async fn validate_session(&self, session_id: &str) -> bool {
        self.get_session(session_id).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_store::MemoryCacheStore;
    use crate::cache::testing::{CacheOp, FlakyCacheStore};
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(30 * 60);

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryCacheStore>,
        flaky: Arc<FlakyCacheStore>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
        let flaky = Arc::new(FlakyCacheStore::new(store.clone()));
        let manager = SessionManager::new(flaky.clone(), TTL).with_clock(clock.clone());
        Fixture {
            clock,
            store,
            flaky,
            manager,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trip() {
        let f = fixture();
        let token = f
            .manager
            .create_session(1, "alice", Some("a@x.com"))
            .await
            .unwrap();

        let session = f.manager.get_session(&token).await.unwrap();
        assert_eq!(session.session_id, token);
        assert_eq!(session.user_id, 1);
        assert_eq!(session.username, "alice");
        assert_eq!(session.email.as_deref(), Some("a@x.com"));
        assert!(session.expire_at > f.clock.now());
        assert_eq!(session.expire_at - session.issued_at, chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn empty_email_is_omitted() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", Some("")).await.unwrap();
        let session = f.manager.get_session(&token).await.unwrap();
        assert_eq!(session.email, None);
    }

    #[tokio::test]
    async fn concurrent_sessions_for_one_user_do_not_collide() {
        let f = fixture();
        let (a, b) = tokio::join!(
            f.manager.create_session(1, "alice", None),
            f.manager.create_session(1, "alice", None)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);
        assert_eq!(f.manager.list_user_sessions(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sliding_expiration_keeps_active_sessions_alive() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();

        for _ in 0..10 {
            f.clock.advance(Duration::from_secs(20 * 60));
            let session = f.manager.get_session(&token).await.unwrap();
            assert_eq!(session.expire_at, f.clock.now() + chrono::Duration::minutes(30));
        }

        f.clock.advance(Duration::from_secs(31 * 60));
        assert!(f.manager.get_session(&token).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn refresh_extends_expiry() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();

        f.clock.advance(Duration::from_secs(25 * 60));
        f.manager.refresh_session(&token).await.unwrap();
        assert_eq!(f.store.ttl(&session_key(&token)), Some(TTL));

        f.clock.advance(Duration::from_secs(25 * 60));
        assert!(f.manager.validate_session(&token).await);
    }

    #[tokio::test]
    async fn refresh_tolerates_missing_session() {
        let f = fixture();
        f.manager.refresh_session("missing").await.unwrap();
        assert!(!f.store.contains(&session_key("missing")));
    }

    #[tokio::test]
    async fn refresh_does_not_resurrect_destroyed_session() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();
        f.manager.destroy_session(&token).await.unwrap();

        f.manager.refresh_session(&token).await.unwrap();
        assert!(!f.store.contains(&session_key(&token)));
        assert!(!f.manager.validate_session(&token).await);
    }

    #[tokio::test]
    async fn session_expired_in_content_is_purged() {
        let f = fixture();
        let token = f.manager.create_session(7, "bob", None).await.unwrap();

        // 内容已过期但缓存键仍然存在
        let key = session_key(&token);
        let mut session: SessionData =
            serde_json::from_slice(&f.store.get(&key).await.unwrap().unwrap()).unwrap();
        session.expire_at = f.clock.now() - chrono::Duration::seconds(1);
        f.store
            .set(&key, &serde_json::to_vec(&session).unwrap(), TTL)
            .await
            .unwrap();

        assert!(f.manager.get_session(&token).await.unwrap_err().is_not_found());
        assert!(!f.store.contains(&key));
        assert!(f.store.set_members(&user_sessions_key(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_outlives_sessions() {
        let f = fixture();
        let token = f.manager.create_session(3, "carol", None).await.unwrap();
        assert_eq!(f.store.ttl(&user_sessions_key(3)), Some(TTL * 2));

        f.clock.advance(Duration::from_secs(20 * 60));
        f.manager.get_session(&token).await.unwrap();
        assert_eq!(f.store.ttl(&user_sessions_key(3)), Some(TTL * 2));
    }

    #[tokio::test]
    async fn index_failure_rolls_back_session() {
        let f = fixture();
        f.flaky.fail_op(CacheOp::SetAdd);

        let err = f.manager.create_session(1, "alice", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn index_ttl_failure_rolls_back_session() {
        let f = fixture();
        f.flaky.fail_op(CacheOp::Expire);

        let err = f.manager.create_session(1, "alice", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn rollback_survives_index_cleanup_failure() {
        let f = fixture();
        f.flaky.fail_op(CacheOp::Expire);
        f.flaky.fail_op(CacheOp::SetRemove);

        let err = f.manager.create_session(1, "alice", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
        // 会话键已回滚，残留的索引成员留给 list_user_sessions 清理
        assert_eq!(f.store.len(), 1);
        assert!(f.store.contains(&user_sessions_key(1)));
    }

    #[tokio::test]
    async fn session_write_failure_is_creation_error() {
        let f = fixture();
        f.flaky.fail_op(CacheOp::Set);

        let err = f.manager.create_session(1, "alice", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn lookup_faults_are_distinct_from_not_found() {
        let f = fixture();
        f.store
            .set(&session_key("corrupt"), b"not json", TTL)
            .await
            .unwrap();
        assert!(matches!(
            f.manager.get_session("corrupt").await,
            Err(SessionError::Lookup(_))
        ));

        let token = f.manager.create_session(1, "alice", None).await.unwrap();
        f.flaky.fail_op(CacheOp::Get);
        assert!(matches!(
            f.manager.get_session(&token).await,
            Err(SessionError::Lookup(_))
        ));
        assert!(!f.manager.validate_session(&token).await);
    }

    #[tokio::test]
    async fn refresh_failure_does_not_fail_read() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();
        f.flaky.fail_op(CacheOp::Replace);
        assert_eq!(f.manager.get_session(&token).await.unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();

        assert_eq!(f.manager.destroy_session(&token).await.unwrap(), Some(1));
        assert!(f.manager.get_session(&token).await.unwrap_err().is_not_found());
        assert_eq!(f.manager.destroy_session(&token).await.unwrap(), None);
        assert_eq!(f.manager.destroy_session("never-issued").await.unwrap(), None);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn destroy_deletes_session_when_record_unreadable() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();
        f.flaky.fail_op(CacheOp::Get);

        assert_eq!(f.manager.destroy_session(&token).await.unwrap(), None);
        assert!(!f.store.contains(&session_key(&token)));
    }

    #[tokio::test]
    async fn huge_ttl_does_not_overflow() {
        let store = Arc::new(MemoryCacheStore::new());
        let manager = SessionManager::new(store.clone(), Duration::from_secs(u64::MAX / 2 + 1));

        let token = manager.create_session(1, "alice", None).await.unwrap();
        assert!(store.contains(&session_key(&token)));
        assert!(store.contains(&user_sessions_key(1)));
    }

    #[tokio::test]
    async fn destroy_deletes_session_even_if_index_update_fails() {
        let f = fixture();
        let token = f.manager.create_session(1, "alice", None).await.unwrap();
        f.flaky.fail_op(CacheOp::SetRemove);

        f.manager.destroy_session(&token).await.unwrap();
        assert!(!f.manager.validate_session(&token).await);
    }

    #[tokio::test]
    async fn bulk_revocation_invalidates_every_session_of_the_user() {
        let f = fixture();
        let mut tokens = Vec::new();
        for _ in 0..3 {
            tokens.push(f.manager.create_session(1, "alice", None).await.unwrap());
        }
        let other = f.manager.create_session(2, "bob", None).await.unwrap();

        assert_eq!(f.manager.destroy_all_user_sessions(1).await.unwrap(), 3);
        for token in &tokens {
            assert!(!f.manager.validate_session(token).await);
        }
        assert!(f.manager.validate_session(&other).await);
        assert!(!f.store.contains(&user_sessions_key(1)));

        assert_eq!(f.manager.destroy_all_user_sessions(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_revocation_keeps_index_when_a_delete_fails() {
        let f = fixture();
        let a = f.manager.create_session(1, "alice", None).await.unwrap();
        let b = f.manager.create_session(1, "alice", None).await.unwrap();
        f.flaky.fail_key(&session_key(&a));

        assert!(f.manager.destroy_all_user_sessions(1).await.is_err());
        assert!(!f.store.contains(&session_key(&b)));
        assert!(f.store.contains(&user_sessions_key(1)));

        f.flaky.heal();
        f.manager.destroy_all_user_sessions(1).await.unwrap();
        assert!(!f.manager.validate_session(&a).await);
        assert!(!f.store.contains(&user_sessions_key(1)));
    }

    #[tokio::test]
    async fn listing_prunes_stale_index_members() {
        let f = fixture();
        let live = f.manager.create_session(1, "alice", None).await.unwrap();
        let gone = f.manager.create_session(1, "alice", None).await.unwrap();
        f.store.delete(&session_key(&gone)).await.unwrap();

        let sessions = f.manager.list_user_sessions(1).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, live);
        assert_eq!(
            f.store.set_members(&user_sessions_key(1)).await.unwrap(),
            vec![live]
        );
    }
}
