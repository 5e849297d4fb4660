//! API key routes. Separate from the generic CRUD handlers because keys
//! are addressed by UUID and support no update.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::admin::api_key::{ApiKeyFull, ApiKeyShort, ApiKeyService};
use crate::admin::resource::{AuthContext, Collection, ResourceObject};
use crate::error::AppError;

pub fn api_key_routes(service: Arc<ApiKeyService>) -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(find).delete(destroy))
        .with_state(service)
}

async fn list(
    State(service): State<Arc<ApiKeyService>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Collection<ResourceObject<ApiKeyShort>>>, AppError> {
    service.list(&auth).await.map(Json)
}

async fn find(
    State(service): State<Arc<ApiKeyService>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourceObject<ApiKeyFull>>, AppError> {
    service.find(&auth, id).await.map(Json)
}

async fn create(
    State(service): State<Arc<ApiKeyService>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<(StatusCode, Json<ResourceObject<ApiKeyFull>>), AppError> {
    let key = service.create(&auth).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

async fn destroy(
    State(service): State<Arc<ApiKeyService>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
