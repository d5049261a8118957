pub mod user;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
};

/// 组装全部路由，挂载在 `API_BASE_URI` 下
pub fn router(state: AppState) -> Router {
    // 公开路由
    let public_routes = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login));

    // 需要会话认证的路由
    let protected_routes = Router::new()
        .route("/users/{id}", get(user::get_user_info))
        .route("/session", get(user::current_session))
        .route("/logout", post(user::logout))
        .route("/logout-all", post(user::logout_all))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);

    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore, UserCache};
    use crate::config::Config;
    use crate::database::MemoryUserStore;
    use crate::service::UserService;
    use crate::session::SessionManager;
    use crate::utils::BcryptHasher;

    fn test_state() -> AppState {
        let config = Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost/test".to_string()),
            "REDIS_URL" => Some("redis://localhost".to_string()),
            _ => None,
        })
        .unwrap();

        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let sessions = Arc::new(SessionManager::new(cache.clone(), config.session_ttl()));
        let service = UserService::new(
            Arc::new(MemoryUserStore::new()),
            UserCache::new(cache, config.user_cache_ttl()),
            sessions,
            Arc::new(BcryptHasher::new(4)),
            Duration::from_secs(3600),
        );

        AppState {
            config,
            service: Arc::new(service),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, cookie, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn register_and_login(app: &Router) -> String {
        let (status, _, body) = send(
            app,
            post_json(
                "/api/register",
                json!({"username": "alice", "email": "a@x.com", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _, body) = send(
            app,
            post_json("/api/login", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie() {
        let app = router(test_state());
        send(
            &app,
            post_json(
                "/api/register",
                json!({"username": "alice", "email": "a@x.com", "password": "secret1"}),
            ),
        )
        .await;

        let (status, cookie, body) = send(
            &app,
            post_json("/api/login", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "alice");
        assert!(body["user"].get("password_hash").is_none());

        let cookie = cookie.unwrap();
        let token = body["token"].as_str().unwrap();
        assert!(cookie.starts_with(&format!("session_id={token}")));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn invalid_credentials_are_unauthorized() {
        let app = router(test_state());
        register_and_login(&app).await;

        let (status, cookie, wrong) = send(
            &app,
            post_json("/api/login", json!({"username": "alice", "password": "wrong-pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(cookie.is_none());

        let (status, _, unknown) = send(
            &app,
            post_json("/api/login", json!({"username": "nobody", "password": "wrong-pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong["message"], unknown["message"]);
    }

    #[tokio::test]
    async fn invalid_input_is_bad_request() {
        let app = router(test_state());

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/register",
                json!({"username": "a!", "email": "a@x.com", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let request = Request::post("/api/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "请求参数错误");
    }

    #[tokio::test]
    async fn duplicate_registration_reports_outcome() {
        let app = router(test_state());
        register_and_login(&app).await;

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/register",
                json!({"username": "alice", "email": "b@x.com", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body.get("user_id").is_none());
    }

    #[tokio::test]
    async fn protected_routes_require_session() {
        let app = router(test_state());
        let token = register_and_login(&app).await;

        let request = Request::get("/api/users/1").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _, _) = send(&app, get_with_bearer("/api/users/1", "bogus")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = send(&app, get_with_bearer("/api/users/1", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "a@x.com");

        let (status, _, _) = send(&app, get_with_bearer("/api/users/99", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(&app, get_with_bearer("/api/users/abc", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cookie_authenticates_when_header_absent() {
        let app = router(test_state());
        let token = register_and_login(&app).await;

        let request = Request::get("/api/session")
            .header(header::COOKIE, format!("session_id={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user_id"], 1);
        assert_eq!(body["data"]["username"], "alice");
    }

    #[tokio::test]
    async fn logout_invalidates_session_and_clears_cookie() {
        let app = router(test_state());
        let token = register_and_login(&app).await;

        let request = Request::post("/api/logout")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, cookie, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(cookie.unwrap().starts_with("session_id="));

        let (status, _, _) = send(&app, get_with_bearer("/api/session", &token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_all_revokes_every_device() {
        let app = router(test_state());
        let first = register_and_login(&app).await;
        let (_, _, body) = send(
            &app,
            post_json("/api/login", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        let second = body["token"].as_str().unwrap().to_string();

        let request = Request::post("/api/logout-all")
            .header(header::AUTHORIZATION, format!("Bearer {first}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["revoked"], 2);

        for token in [&first, &second] {
            let (status, _, _) = send(&app, get_with_bearer("/api/session", token)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
}
