//! Account settings handlers.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use std::sync::Arc;

use crate::admin::resource::AuthContext;
use crate::admin::settings::PasswordUpdateRequest;
use crate::error::AppError;
use crate::gateway::state::AppState;

/// PUT /settings/password
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PasswordUpdateRequest>,
) -> Result<StatusCode, AppError> {
    state.admin.settings.update_password(&auth, &req).await?;
    Ok(StatusCode::NO_CONTENT)
}
