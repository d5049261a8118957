//! 会话管理
//!
//! 会话令牌的生成、校验、滑动续期与吊销都集中在 [`SessionManager`] 中。
//! 会话数据保存在缓存存储里，键布局见 [`crate::cache::keys::session_keys`]。

mod manager;
mod token;

pub use crate::cache::models::SessionData;
pub use manager::SessionManager;
pub use token::{TOKEN_BYTES, generate_token};
