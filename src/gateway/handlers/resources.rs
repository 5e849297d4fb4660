//! Navigable-resources map for UIs.

use axum::Json;
use axum::extract::{Extension, State};
use std::sync::Arc;

use crate::admin::resource::{AuthContext, ResourceMeta};
use crate::error::AppError;
use crate::gateway::state::AppState;

/// GET /resources: keys and class permissions of every resource the
/// caller can read.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ResourceMeta>>, AppError> {
    Ok(Json(state.admin.resource_metas(&auth)))
}
