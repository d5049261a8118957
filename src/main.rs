use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_service::{
    AppState,
    cache::{CacheStore, RedisCacheStore, UserCache},
    config::Config,
    database::PgUserRepository,
    routes,
    service::UserService,
    session::SessionManager,
    utils::BcryptHasher,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'user_service';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    // 设置 Redis 客户端
    let redis_client =
        RedisClient::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let cache: Arc<dyn CacheStore> = Arc::new(
        RedisCacheStore::connect(&Arc::new(redis_client), config.cache_op_timeout())
            .await
            .expect("Failed to connect to Redis"),
    );

    // 组装服务
    // 各组件的日志都挂在 user_service 根 span 下
    let root = tracing::info_span!("user_service", port = config.server_port);
    let sessions = Arc::new(
        SessionManager::new(cache.clone(), config.session_ttl()).with_span(tracing::info_span!(
            parent: &root,
            "sessions",
            ttl_secs = config.session_ttl_secs
        )),
    );
    let users = UserCache::new(cache, config.user_cache_ttl())
        .with_span(tracing::info_span!(parent: &root, "user_cache"));
    let service = UserService::new(
        Arc::new(PgUserRepository::new(pool)),
        users,
        sessions,
        Arc::new(BcryptHasher::default()),
        config.token_cache_ttl(),
    )
    .with_span(tracing::info_span!(parent: &root, "auth"));

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        service: Arc::new(service),
    };

    let router = routes::router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        // 设置开发环境的CORS，允许所有来源
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router,
    )
    .await
    .expect("Failed to start server");
}
