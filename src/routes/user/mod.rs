mod handler;
mod model;

pub use handler::{current_session, get_user_info, login, logout, logout_all, register};
pub use model::{LoginRequest, LogoutAllResponse, RegisterRequest};
