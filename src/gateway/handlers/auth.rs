//! Login, session and current-user handlers.

use axum::extract::{Extension, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::admin::resource::{AuthContext, ResourceObject, ResourcePolicy, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::user::UserPolicy;
use crate::auth::session::{self, SessionStore};
use crate::auth::LogInRequest;
use crate::error::AppError;
use crate::gateway::state::AppState;

/// POST /auth/login: password login issuing a bearer token.
pub async fn log_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.log_in_with_access_token(&req).await?;
    Ok(Json(response))
}

/// POST /auth/session: password login writing a server-side session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.log_in_with_session(&req).await?;
    Ok((
        AppendHeaders([(SET_COOKIE, SessionStore::cookie(&token))]),
        Json(json!({ "success": true })),
    ))
}

/// DELETE /auth/session: destroy the session and clear the cookie.
pub async fn destroy_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = headers
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session::token_from_cookie_header)
    {
        state.auth.destroy_session(token);
    }

    Ok((
        AppendHeaders([(SET_COOKIE, SessionStore::clear_cookie())]),
        Json(json!({ "success": true })),
    ))
}

/// GET /users/me: the caller's own user record, outside the admin-only
/// users scope.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    if !auth.is_authenticated() || auth.user_id() == 0 {
        return Err(AppError::unauthorized("authentication required"));
    }

    let user = state
        .store
        .users
        .find(&ScopeFilter::All, auth.user_id())
        .await?;
    let permissions = UserPolicy.instance_permissions(&auth, &user);

    Ok((
        StatusCode::OK,
        Json(ResourceObject {
            resource: user,
            permissions,
        }),
    ))
}
