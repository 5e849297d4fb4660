//! HTTP gateway: router assembly and server startup.

pub mod handlers;
pub mod state;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use std::any::Any;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

use crate::auth::middleware::authenticate;
use crate::gateway::handlers::health::{DatabasePinger, HealthCheckParams, run_health_checks};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    // `/users/me` must win over `/users/{id}`; static segments take
    // priority, so merging both routers under one prefix is enough.
    let users_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .with_state(state.clone())
        .merge(handlers::resource_routes(state.admin.users.clone()));

    let admin_api = Router::new()
        .nest("/apps", handlers::resource_routes(state.admin.apps.clone()))
        .nest(
            "/app_demand_profiles",
            handlers::resource_routes(state.admin.app_demand_profiles.clone()),
        )
        .nest(
            "/auction_configurations",
            handlers::resource_routes(state.admin.auction_configurations.clone()),
        )
        .nest(
            "/auction_configurations_v2",
            handlers::resource_routes(state.admin.auction_configurations_v2.clone()),
        )
        .nest(
            "/countries",
            handlers::resource_routes(state.admin.countries.clone()),
        )
        .nest(
            "/demand_sources",
            handlers::resource_routes(state.admin.demand_sources.clone()),
        )
        .nest(
            "/demand_source_accounts",
            handlers::resource_routes(state.admin.demand_source_accounts.clone()),
        )
        .nest(
            "/line_items",
            handlers::resource_routes(state.admin.line_items.clone()),
        )
        .nest(
            "/segments",
            handlers::resource_routes(state.admin.segments.clone()),
        )
        .nest("/users", users_routes)
        .nest(
            "/api_keys",
            handlers::api_keys::api_key_routes(state.admin.api_keys.clone()),
        )
        .merge(
            Router::new()
                .route("/resources", get(handlers::resources::list))
                .route("/settings/password", put(handlers::settings::update_password))
                .with_state(state.clone()),
        )
        .layer(from_fn_with_state(state.clone(), authenticate));

    let public = Router::new()
        .route("/auth/login", post(handlers::auth::log_in))
        .route(
            "/auth/session",
            post(handlers::auth::create_session).delete(handlers::auth::destroy_session),
        )
        .route("/health_checks", get(health_checks))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(admin_api)
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// A panicking handler must still answer with the error envelope instead of
/// tearing down the connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!("handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({
            "error": { "code": 500, "message": "internal server error" }
        })),
    )
        .into_response()
}

async fn health_checks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut services = HealthCheckParams::new();
    services.insert(
        "database",
        Some(Arc::new(DatabasePinger::new(state.db.clone())) as _),
    );

    run_health_checks(&services).await
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("admin gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
