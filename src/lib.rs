use config::Config;
use service::UserService;
use std::sync::Arc;

pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod result;
pub mod service;
pub mod session;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<UserService>,
}
