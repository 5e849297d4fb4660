//! App demand profile repository. Ownership is indirect: a profile belongs
//! to whoever owns its app, so owned scopes filter on the joined app row.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::admin::app_demand_profile::{AppDemandProfile, AppDemandProfileAttrs};
use crate::admin::demand_source::{DemandSource, DemandSourceAttrs};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::store::{
    apps, demand_source_accounts, int_param, push_order_and_page, translate_db_error,
};

const SELECT_PROFILES: &str = "SELECT p.id, p.app_id, p.demand_source_id, p.account_id, p.account_type, p.data, \
     p.public_uid, \
     a.platform_id AS app_platform_id, a.human_name AS app_human_name, \
     a.package_name AS app_package_name, a.user_id AS app_user_id, a.app_key AS app_app_key, \
     s.user_id AS account_user_id, s.label AS account_label, s.type AS account_type_name, \
     s.is_bidding AS account_is_bidding, s.is_default AS account_is_default, \
     s.extra AS account_extra, \
     d.human_name AS demand_source_human_name, d.api_key AS demand_source_api_key \
     FROM app_demand_profiles p \
     INNER JOIN apps a ON a.id = p.app_id \
     INNER JOIN demand_source_accounts s ON s.id = p.account_id \
     INNER JOIN demand_sources d ON d.id = p.demand_source_id";
const COUNT_PROFILES: &str =
    "SELECT COUNT(*) FROM app_demand_profiles p INNER JOIN apps a ON a.id = p.app_id";

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: i64,
    app_id: i64,
    demand_source_id: i64,
    account_id: i64,
    account_type: String,
    data: Json<Map<String, Value>>,
    public_uid: Option<i64>,
    app_platform_id: i16,
    app_human_name: String,
    app_package_name: Option<String>,
    app_user_id: i64,
    app_app_key: Option<String>,
    account_user_id: i64,
    account_label: Option<String>,
    account_type_name: String,
    account_is_bidding: Option<bool>,
    account_is_default: Option<bool>,
    account_extra: Json<Map<String, Value>>,
    demand_source_human_name: String,
    demand_source_api_key: String,
}

fn to_resource(row: ProfileRow) -> AppDemandProfile {
    AppDemandProfile {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        attrs: AppDemandProfileAttrs {
            app_id: Some(row.app_id),
            demand_source_id: Some(row.demand_source_id),
            account_id: Some(row.account_id),
            data: Some(row.data.0),
            account_type: Some(row.account_type),
        },
        app: apps::summary_from_parts(
            row.app_id,
            row.app_platform_id,
            row.app_human_name,
            row.app_package_name,
            row.app_user_id,
            row.app_app_key,
        ),
        account: demand_source_accounts::summary_from_parts(
            row.account_id,
            row.account_user_id,
            row.demand_source_id,
            row.account_label,
            row.account_type_name,
            row.account_is_bidding,
            row.account_is_default,
            row.account_extra.0,
        ),
        demand_source: DemandSource {
            id: row.demand_source_id,
            attrs: DemandSourceAttrs {
                human_name: Some(row.demand_source_human_name),
                api_key: Some(row.demand_source_api_key),
            },
        },
    }
}

#[derive(Debug, Default)]
struct ProfileFilters {
    app_id: Option<i64>,
    account_id: Option<i64>,
    demand_source_id: Option<i64>,
}

impl ProfileFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            app_id: int_param(params, "app_id"),
            account_id: int_param(params, "account_id"),
            demand_source_id: int_param(params, "demand_source_id"),
        }
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, sqlx::Postgres>,
    scope: &ScopeFilter,
    filters: &ProfileFilters,
) {
    match scope {
        ScopeFilter::All => {}
        ScopeFilter::OwnedBy(user_id) | ScopeFilter::OwnedOrSharedBy(user_id) => {
            qb.push(" AND a.user_id = ");
            qb.push_bind(*user_id);
        }
    }

    if let Some(app_id) = filters.app_id {
        qb.push(" AND p.app_id = ");
        qb.push_bind(app_id);
    }
    if let Some(account_id) = filters.account_id {
        qb.push(" AND p.account_id = ");
        qb.push_bind(account_id);
    }
    if let Some(demand_source_id) = filters.demand_source_id {
        qb.push(" AND p.demand_source_id = ");
        qb.push_bind(demand_source_id);
    }
}

pub struct AppDemandProfileRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl AppDemandProfileRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<ProfileRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_PROFILES);
        qb.push(" WHERE p.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }
}

#[async_trait]
impl ResourceRepo for AppDemandProfileRepo {
    type Resource = AppDemandProfile;
    type Attrs = AppDemandProfileAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<AppDemandProfile>, AppError> {
        let filters = ProfileFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_PROFILES);
        count_qb.push(" WHERE TRUE");
        push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_PROFILES);
        qb.push(" WHERE TRUE");
        push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "p.id", params);

        let rows: Vec<ProfileRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<AppDemandProfile, AppError> {
        let mut qb = QueryBuilder::new(SELECT_PROFILES);
        qb.push(" WHERE p.id = ");
        qb.push_bind(id);
        push_filters(&mut qb, scope, &ProfileFilters::default());

        let row: ProfileRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &AppDemandProfileAttrs) -> Result<AppDemandProfile, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO app_demand_profiles \
             (app_id, demand_source_id, account_id, account_type, data, public_uid) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(attrs.app_id.unwrap_or_default())
        .bind(attrs.demand_source_id.unwrap_or_default())
        .bind(attrs.account_id.unwrap_or_default())
        .bind(attrs.account_type.clone().unwrap_or_default())
        .bind(Json(attrs.data.clone().unwrap_or_default()))
        .bind(public_uid)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_error)?;

        let row = Self::fetch_one(&mut *tx, id).await?;
        tx.commit().await.map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(
        &self,
        id: i64,
        attrs: &AppDemandProfileAttrs,
    ) -> Result<AppDemandProfile, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new("UPDATE app_demand_profiles SET updated_at = now()");
        if let Some(app_id) = attrs.app_id {
            qb.push(", app_id = ");
            qb.push_bind(app_id);
        }
        if let Some(demand_source_id) = attrs.demand_source_id {
            qb.push(", demand_source_id = ");
            qb.push_bind(demand_source_id);
        }
        if let Some(account_id) = attrs.account_id {
            qb.push(", account_id = ");
            qb.push_bind(account_id);
        }
        if let Some(account_type) = &attrs.account_type {
            qb.push(", account_type = ");
            qb.push_bind(account_type);
        }
        if let Some(data) = &attrs.data {
            qb.push(", data = ");
            qb.push_bind(Json(data.clone()));
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING id");

        let updated: Option<i64> = qb
            .build_query_scalar()
            .fetch_optional(&mut *tx)
            .await
            .map_err(translate_db_error)?;
        let id = updated.ok_or(AppError::NotFound)?;

        let row = Self::fetch_one(&mut *tx, id).await?;
        tx.commit().await.map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM app_demand_profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(translate_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
