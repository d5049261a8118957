// 数据库模块
// 包含用户实体定义和存储库操作

pub mod models; // 数据库实体定义
pub mod repositories; // 存储库接口与 Postgres 实现

#[cfg(any(test, feature = "mocks"))]
pub mod memory;

// 重新导出常用类型，方便其他模块使用
#[cfg(any(test, feature = "mocks"))]
pub use memory::MemoryUserStore;
pub use models::user::{NewUser, User, UserInfo};
pub use repositories::user::{PgUserRepository, UserStore};
