use std::sync::Arc;

use crate::admin::AdminService;
use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::db::Database;
use crate::store::Store;

/// Shared gateway state. Everything in here is safe for concurrent use;
/// services hold no per-request state.
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub store: Store,
    pub admin: AdminService,
    pub auth: Arc<AuthService>,
}
