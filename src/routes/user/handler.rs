use axum::{
    extract::{Extension, Json, Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{CookieJar, cookie::Cookie};

use crate::{
    AppState,
    error::AppError,
    result::ApiResult,
    session::SessionData,
    utils::validate::{validate_email, validate_password, validate_username},
};

use super::model::{LoginRequest, LogoutAllResponse, RegisterRequest};

const MSG_BAD_REQUEST: &str = "请求参数错误";

fn bad_request(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection, "请求体解析失败");
    AppError::Validation(MSG_BAD_REQUEST.to_string())
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session_cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.session_cookie_secure)
        .build()
}

/// 无论请求是否携带 Cookie 都下发删除指令，Bearer 登录的客户端也能清掉残留 Cookie
fn clear_session_cookie(state: &AppState, jar: CookieJar) -> CookieJar {
    let mut cookie = session_cookie(state, String::new());
    cookie.make_removal();
    jar.add(cookie)
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(bad_request)?;

    validate_username(&req.username)
        .and_then(|_| validate_email(&req.email))
        .and_then(|_| validate_password(&req.password))
        .map_err(AppError::Validation)?;

    let outcome = state
        .service
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok((StatusCode::OK, Json(outcome)).into_response())
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(bad_request)?;
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(MSG_BAD_REQUEST.to_string()));
    }

    let outcome = state.service.login(&req.username, &req.password).await?;

    let Some(token) = outcome.token.clone().filter(|_| outcome.success) else {
        return Ok((StatusCode::UNAUTHORIZED, Json(outcome)).into_response());
    };

    // 令牌同时写入 HttpOnly Cookie 和响应体
    let jar = jar.add(session_cookie(&state, token));
    Ok((StatusCode::OK, jar, Json(outcome)).into_response())
}

#[axum::debug_handler]
pub async fn get_user_info(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(user_id) = id.map_err(|_| AppError::Validation("无效的用户ID".to_string()))?;

    let outcome = state.service.get_user_info(user_id).await?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    Ok((status, Json(outcome)).into_response())
}

/// 返回当前请求的会话信息，认证中间件已完成校验
#[axum::debug_handler]
pub async fn current_session(
    Extension(session): Extension<SessionData>,
) -> Json<ApiResult<SessionData>> {
    Json(ApiResult::success("会话有效", session))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionData>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResult<()>>), AppError> {
    state.service.logout(&session.session_id).await?;

    let jar = clear_session_cookie(&state, jar);
    Ok((jar, Json(ApiResult::ok("成功登出"))))
}

#[axum::debug_handler]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(session): Extension<SessionData>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResult<LogoutAllResponse>>), AppError> {
    let revoked = state.service.logout_all(session.user_id).await?;

    let jar = clear_session_cookie(&state, jar);
    Ok((
        jar,
        Json(ApiResult::success(
            "已登出所有设备",
            LogoutAllResponse { revoked },
        )),
    ))
}
