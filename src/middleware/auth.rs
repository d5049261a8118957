use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{AppState, error::AppError, utils::mask_token};

/// 会话认证中间件
///
/// 优先读取 `Authorization: Bearer <token>`，没有时退回会话 Cookie。
/// 校验通过后把 [`SessionData`](crate::session::SessionData) 放进请求扩展。
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_owned())
        .or_else(|| {
            jar.get(&state.config.session_cookie_name)
                .map(|cookie| cookie.value().to_owned())
        })
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingCredentials)?;

    let session = state.service.authenticate(&token).await.map_err(|e| {
        if e.is_not_found() {
            tracing::debug!(session = %mask_token(&token), "会话无效");
        }
        AppError::from(e)
    })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
