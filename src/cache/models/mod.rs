/// 缓存数据模型
/// 定义缓存数据的结构体
// 用户缓存模型
pub mod user;

// 会话缓存模型
pub mod session;

// 重新导出常用类型
pub use session::SessionData;
pub use user::CachedUser;
