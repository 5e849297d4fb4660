//! Admin backend entry point: config, logging, database, services, gateway.

use std::sync::Arc;

use mediation_admin::admin::AdminService;
use mediation_admin::auth::AuthService;
use mediation_admin::config::AppConfig;
use mediation_admin::db::Database;
use mediation_admin::gateway::{self, state::AppState};
use mediation_admin::keys::SnowflakeNode;
use mediation_admin::logging;
use mediation_admin::store::Store;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _guard = logging::init_logging(&config);

    tracing::info!("starting mediation admin backend (env: {})", env);

    let db = Database::connect(&config.database_url).await?;

    let snowflake = Arc::new(SnowflakeNode::new(config.snowflake_node)?);
    let store = Store::new(db.pool().clone(), snowflake);

    let auth = Arc::new(AuthService::new(
        store.users.clone(),
        store.api_keys.clone(),
        config.jwt_secret.clone(),
        config.super_user.clone(),
    ));
    let admin = AdminService::new(&store);

    let state = Arc::new(AppState {
        config,
        db,
        store,
        admin,
        auth,
    });

    gateway::serve(state).await
}
