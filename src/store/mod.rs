//! Persistence layer: one sqlx repository per catalog entity.
//!
//! Repositories own their rows exclusively: they translate datastore
//! errors into the application taxonomy (`RowNotFound` → `NotFound`,
//! unique violations → `Conflict`), interpret scope filters as SQL, and
//! map between attribute records and rows without collapsing absent values
//! into zero values.

pub mod api_keys;
pub mod app_demand_profiles;
pub mod apps;
pub mod auction_configurations;
pub mod countries;
pub mod demand_source_accounts;
pub mod demand_sources;
pub mod line_items;
pub mod segments;
pub mod users;

use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;

use crate::admin::pagination::{Pagination, SortOrder};
use crate::admin::resource::QueryParams;
use crate::error::AppError;
use crate::keys::SnowflakeNode;

pub use api_keys::ApiKeyRepo;
pub use app_demand_profiles::AppDemandProfileRepo;
pub use apps::AppRepo;
pub use auction_configurations::AuctionConfigurationRepo;
pub use countries::CountryRepo;
pub use demand_source_accounts::DemandSourceAccountRepo;
pub use demand_sources::DemandSourceRepo;
pub use line_items::LineItemRepo;
pub use segments::SegmentRepo;
pub use users::UserRepo;

/// All repositories over one connection pool.
pub struct Store {
    pub apps: Arc<AppRepo>,
    pub users: Arc<UserRepo>,
    pub countries: Arc<CountryRepo>,
    pub demand_sources: Arc<DemandSourceRepo>,
    pub demand_source_accounts: Arc<DemandSourceAccountRepo>,
    pub app_demand_profiles: Arc<AppDemandProfileRepo>,
    pub line_items: Arc<LineItemRepo>,
    pub segments: Arc<SegmentRepo>,
    pub auction_configurations: Arc<AuctionConfigurationRepo>,
    pub auction_configurations_v2: Arc<AuctionConfigurationRepo>,
    pub api_keys: Arc<ApiKeyRepo>,
}

impl Store {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self {
            apps: Arc::new(AppRepo::new(pool.clone(), snowflake.clone())),
            users: Arc::new(UserRepo::new(pool.clone(), snowflake.clone())),
            countries: Arc::new(CountryRepo::new(pool.clone())),
            demand_sources: Arc::new(DemandSourceRepo::new(pool.clone())),
            demand_source_accounts: Arc::new(DemandSourceAccountRepo::new(
                pool.clone(),
                snowflake.clone(),
            )),
            app_demand_profiles: Arc::new(AppDemandProfileRepo::new(
                pool.clone(),
                snowflake.clone(),
            )),
            line_items: Arc::new(LineItemRepo::new(pool.clone(), snowflake.clone())),
            segments: Arc::new(SegmentRepo::new(pool.clone(), snowflake.clone())),
            auction_configurations: Arc::new(AuctionConfigurationRepo::new(
                pool.clone(),
                snowflake.clone(),
                false,
            )),
            auction_configurations_v2: Arc::new(AuctionConfigurationRepo::new(
                pool.clone(),
                snowflake.clone(),
                true,
            )),
            api_keys: Arc::new(ApiKeyRepo::new(pool)),
        }
    }
}

/// Map a sqlx error onto the application taxonomy.
pub(crate) fn translate_db_error(error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::RowNotFound => AppError::NotFound,
        sqlx::Error::Database(db)
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation =>
        {
            AppError::conflict(format!(
                "already exists: {}",
                db.constraint().unwrap_or("unique constraint")
            ))
        }
        other => AppError::Database(other),
    }
}

/// Append `ORDER BY <id column> <dir>` plus `LIMIT/OFFSET` when pagination
/// is enabled. `total_count` is computed by a separate count query built
/// from the same filters, so it never sees these clauses.
pub(crate) fn push_order_and_page(
    qb: &mut QueryBuilder<'_, Postgres>,
    id_column: &str,
    params: &QueryParams,
) {
    let order = SortOrder::from_query_params(params);
    qb.push(" ORDER BY ");
    qb.push(id_column);
    qb.push(" ");
    qb.push(order.sql());

    if let Some(page) = Pagination::from_query_params(params) {
        qb.push(" LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
    }
}

/// Parse an integer query parameter; invalid values count as not provided.
pub(crate) fn int_param(params: &QueryParams, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.parse::<i64>().ok())
}

pub(crate) fn bool_param(params: &QueryParams, key: &str) -> Option<bool> {
    params.get(key).map(|v| v == "true")
}
