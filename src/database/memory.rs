use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use crate::database::models::user::{NewUser, User};
use crate::database::repositories::user::UserStore;
use crate::error::StoreError;

/// 内存用户存储，测试与本地开发使用
pub struct MemoryUserStore {
    pub users: Mutex<Vec<User>>,
    next_id: AtomicU64,
    reads: AtomicU64,
    fail_reads: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(vec![]),
            next_id: AtomicU64::new(1),
            reads: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// find_by_id / find_by_username 的调用次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 让后续查询返回存储故障
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Result<User, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Storage("connection reset".to_owned()));
        }
        let users = self.users.lock().unwrap();
        users.iter().find(|u| pred(u)).cloned().ok_or(StoreError::NotFound)
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &NewUser) -> Result<u64, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("users_username_key".to_owned()));
        }
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("users_email_key".to_owned()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        users.push(user.clone().into_user(id));
        drop(users);

        Ok(id)
    }

    async fn find_by_id(&self, id: u64) -> Result<User, StoreError> {
        self.find(|u| u.id == id)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.find(|u| u.username == username)
    }

    async fn exists_username(&self, username: &str) -> Result<bool, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().any(|u| u.username == username))
    }

    async fn exists_email(&self, email: &str) -> Result<bool, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().any(|u| u.email == email))
    }
}
