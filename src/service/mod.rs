//! 认证编排：组合用户存储、用户缓存与会话管理器

mod user;

pub use user::{LoginOutcome, RegisterOutcome, UserInfoOutcome, UserService};
