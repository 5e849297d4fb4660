//! Request authentication middleware.
//!
//! Credential resolution order: `Authorization: Bearer` (API-key shaped
//! tokens go to key resolution, everything else to JWT verification), then
//! `Authorization: Basic` (super-user), then the session cookie. A request
//! without credentials proceeds anonymously; policies decide what an
//! anonymous context may see. A presented-but-invalid credential is a hard
//! 401.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::admin::resource::AuthContext;
use crate::error::AppError;
use crate::gateway::state::AppState;
use crate::keys::api_key;

use super::session;

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_ctx = resolve_context(&state, request.headers()).await?;
    request.extensions_mut().insert(auth_ctx);
    Ok(next.run(request).await)
}

async fn resolve_context(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AppError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::unauthorized("malformed authorization header"))?;

        if let Some(token) = value.strip_prefix("Bearer ") {
            if api_key::looks_like_api_key(token) {
                return state.auth.resolve_api_key(token).await;
            }
            return state.auth.verify_access_token(token);
        }

        if let Some(payload) = value.strip_prefix("Basic ") {
            return state.auth.super_user_context(payload);
        }

        return Err(AppError::unauthorized("unsupported authorization scheme"));
    }

    if let Some(ctx) = session_context(state, headers) {
        return Ok(ctx);
    }

    Ok(AuthContext::anonymous())
}

fn session_context(state: &AppState, headers: &HeaderMap) -> Option<AuthContext> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    let token = session::token_from_cookie_header(header)?;
    state.auth.session_context(token)
}
