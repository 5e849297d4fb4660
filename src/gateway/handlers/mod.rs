//! Gateway handlers.
//!
//! The CRUD handlers are generic over [`CrudService`], so every catalog
//! resource is served by the same five functions; per-resource routers are
//! built by [`resource_routes`].

pub mod api_keys;
pub mod auth;
pub mod health;
pub mod resources;
pub mod settings;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::admin::resource::{
    AuthContext, Collection, CrudService, QueryParams, ResourceObject,
};
use crate::error::AppError;

/// CRUD routes for one resource service.
pub fn resource_routes<S: CrudService>(service: Arc<S>) -> Router {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route(
            "/{id}",
            get(find::<S>)
                .put(update::<S>)
                .patch(update::<S>)
                .delete(destroy::<S>),
        )
        .with_state(service)
}

async fn list<S: CrudService>(
    State(service): State<Arc<S>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Collection<ResourceObject<S::Resource>>>, AppError> {
    service.list(&auth, &params).await.map(Json)
}

async fn find<S: CrudService>(
    State(service): State<Arc<S>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Option<ResourceObject<S::Resource>>>, AppError> {
    service.find(&auth, id).await.map(Json)
}

async fn create<S: CrudService>(
    State(service): State<Arc<S>>,
    Extension(auth): Extension<AuthContext>,
    Json(attrs): Json<S::Attrs>,
) -> Result<(StatusCode, Json<ResourceObject<S::Resource>>), AppError> {
    let resource = service.create(&auth, attrs).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn update<S: CrudService>(
    State(service): State<Arc<S>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(attrs): Json<S::Attrs>,
) -> Result<Json<ResourceObject<S::Resource>>, AppError> {
    service.update(&auth, id, attrs).await.map(Json)
}

async fn destroy<S: CrudService>(
    State(service): State<Arc<S>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    service.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
