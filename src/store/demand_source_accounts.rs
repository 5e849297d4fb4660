//! Demand source account repository.
//!
//! Rows join the owning user and the demand source. The "shared" read
//! scope additionally matches the platform house accounts (user ids 0 and
//! 1), which every user may read but not manage.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::admin::demand_source::{DemandSource, DemandSourceAttrs};
use crate::admin::demand_source_account::{
    DemandSourceAccount, DemandSourceAccountAttrs, DemandSourceAccountSummary,
};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::user::User;
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::store::{int_param, push_order_and_page, translate_db_error};

/// User ids whose accounts are readable by everyone.
const SHARED_ACCOUNT_USER_IDS: [i64; 2] = [0, 1];

const SELECT_ACCOUNTS: &str = "SELECT s.id, s.user_id, s.demand_source_id, s.label, s.type, \
     s.is_bidding, s.is_default, s.extra, s.public_uid, \
     u.email AS user_email, u.is_admin AS user_is_admin, u.public_uid AS user_public_uid, \
     d.human_name AS demand_source_human_name, d.api_key AS demand_source_api_key \
     FROM demand_source_accounts s \
     INNER JOIN users u ON u.id = s.user_id \
     INNER JOIN demand_sources d ON d.id = s.demand_source_id";
const COUNT_ACCOUNTS: &str = "SELECT COUNT(*) FROM demand_source_accounts s";

#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    user_id: i64,
    demand_source_id: i64,
    label: Option<String>,
    #[sqlx(rename = "type")]
    account_type: String,
    is_bidding: Option<bool>,
    is_default: Option<bool>,
    extra: Json<Map<String, Value>>,
    public_uid: Option<i64>,
    user_email: String,
    user_is_admin: Option<bool>,
    user_public_uid: Option<i64>,
    demand_source_human_name: String,
    demand_source_api_key: String,
}

fn to_attrs(row: &AccountRow) -> DemandSourceAccountAttrs {
    DemandSourceAccountAttrs {
        user_id: Some(row.user_id),
        label: row.label.clone(),
        account_type: Some(row.account_type.clone()),
        demand_source_id: Some(row.demand_source_id),
        is_bidding: row.is_bidding,
        is_default: row.is_default,
        extra: Some(row.extra.0.clone()),
    }
}

fn to_resource(row: AccountRow) -> DemandSourceAccount {
    let attrs = to_attrs(&row);
    DemandSourceAccount {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        attrs,
        user: User {
            id: row.user_id,
            public_uid: row.user_public_uid.unwrap_or_default().to_string(),
            email: row.user_email,
            is_admin: row.user_is_admin,
        },
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
struct AccountFilters {
    user_id: Option<i64>,
    demand_source_id: Option<i64>,
    account_type: Option<String>,
}

impl AccountFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            user_id: int_param(params, "user_id"),
            demand_source_id: int_param(params, "demand_source_id"),
            account_type: params.get("type").cloned(),
        }
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, sqlx::Postgres>,
    scope: &ScopeFilter,
    filters: &AccountFilters,
) {
    match scope {
        ScopeFilter::All => {}
        ScopeFilter::OwnedBy(user_id) => {
            qb.push(" AND s.user_id = ");
            qb.push_bind(*user_id);
        }
        ScopeFilter::OwnedOrSharedBy(user_id) => {
            qb.push(" AND s.user_id IN (");
            let mut separated = qb.separated(", ");
            separated.push_bind(*user_id);
            for shared in SHARED_ACCOUNT_USER_IDS {
                separated.push_bind(shared);
            }
            qb.push(")");
        }
    }

    if let Some(user_id) = filters.user_id {
        qb.push(" AND s.user_id = ");
        qb.push_bind(user_id);
    }
    if let Some(demand_source_id) = filters.demand_source_id {
        qb.push(" AND s.demand_source_id = ");
        qb.push_bind(demand_source_id);
    }
    if let Some(account_type) = &filters.account_type {
        qb.push(" AND s.type = ");
        qb.push_bind(account_type.clone());
    }
}

pub struct DemandSourceAccountRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl DemandSourceAccountRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<AccountRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_ACCOUNTS);
        qb.push(" WHERE s.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }

    /// Adapter key of the demand source behind an account, `None` when the
    /// account does not exist. Used by the line item validator.
    pub async fn adapter_key(&self, account_id: i64) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            "SELECT d.api_key FROM demand_source_accounts s \
             INNER JOIN demand_sources d ON d.id = s.demand_source_id \
             WHERE s.id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate_db_error)
    }
}

#[async_trait]
impl ResourceRepo for DemandSourceAccountRepo {
    type Resource = DemandSourceAccount;
    type Attrs = DemandSourceAccountAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<DemandSourceAccount>, AppError> {
        let filters = AccountFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_ACCOUNTS);
        count_qb.push(" WHERE TRUE");
        push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_ACCOUNTS);
        qb.push(" WHERE TRUE");
        push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "s.id", params);

        let rows: Vec<AccountRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<DemandSourceAccount, AppError> {
        let mut qb = QueryBuilder::new(SELECT_ACCOUNTS);
        qb.push(" WHERE s.id = ");
        qb.push_bind(id);
        push_filters(&mut qb, scope, &AccountFilters::default());

        let row: AccountRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &DemandSourceAccountAttrs) -> Result<DemandSourceAccount, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO demand_source_accounts \
             (user_id, demand_source_id, label, type, is_bidding, is_default, extra, public_uid) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(attrs.user_id.unwrap_or_default())
        .bind(attrs.demand_source_id.unwrap_or_default())
        .bind(&attrs.label)
        .bind(attrs.account_type.clone().unwrap_or_default())
        .bind(attrs.is_bidding)
        .bind(attrs.is_default)
        .bind(Json(attrs.extra.clone().unwrap_or_default()))
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
        attrs: &DemandSourceAccountAttrs,
    ) -> Result<DemandSourceAccount, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new("UPDATE demand_source_accounts SET updated_at = now()");
        if let Some(user_id) = attrs.user_id {
            qb.push(", user_id = ");
            qb.push_bind(user_id);
        }
        if let Some(demand_source_id) = attrs.demand_source_id {
            qb.push(", demand_source_id = ");
            qb.push_bind(demand_source_id);
        }
        if let Some(label) = &attrs.label {
            qb.push(", label = ");
            qb.push_bind(label);
        }
        if let Some(account_type) = &attrs.account_type {
            qb.push(", type = ");
            qb.push_bind(account_type);
        }
        if let Some(is_bidding) = attrs.is_bidding {
            qb.push(", is_bidding = ");
            qb.push_bind(is_bidding);
        }
        if let Some(is_default) = attrs.is_default {
            qb.push(", is_default = ");
            qb.push_bind(is_default);
        }
        if let Some(extra) = &attrs.extra {
            qb.push(", extra = ");
            qb.push_bind(Json(extra.clone()));
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
        let result = sqlx::query("DELETE FROM demand_source_accounts WHERE id = $1")
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

/// Embedded account representation for line items, from aliased columns.
pub(crate) fn summary_from_parts(
    id: i64,
    user_id: i64,
    demand_source_id: i64,
    label: Option<String>,
    account_type: String,
    is_bidding: Option<bool>,
    is_default: Option<bool>,
    extra: Map<String, Value>,
) -> DemandSourceAccountSummary {
    DemandSourceAccountSummary {
        id,
        attrs: DemandSourceAccountAttrs {
            user_id: Some(user_id),
            label,
            account_type: Some(account_type),
            demand_source_id: Some(demand_source_id),
            is_bidding,
            is_default,
            extra: Some(extra),
        },
    }
}
