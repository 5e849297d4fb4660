//! Demand source repository.
//!
//! Attribute validators resolve the adapter key of a demand source on every
//! write; that lookup goes through a short TTL cache so a burst of writes
//! does not hammer a table that changes a few times a year. The cache is
//! single-flight: concurrent misses for one id share a single query.

use async_trait::async_trait;
use cached::proc_macro::cached;
use sqlx::QueryBuilder;
use sqlx::postgres::PgPool;

use crate::admin::demand_source::{DemandSource, DemandSourceAttrs};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::error::AppError;
use crate::store::{push_order_and_page, translate_db_error};

const SELECT_DEMAND_SOURCES: &str =
    "SELECT d.id, d.human_name, d.api_key FROM demand_sources d";
const COUNT_DEMAND_SOURCES: &str = "SELECT COUNT(*) FROM demand_sources d";

/// TTL for cached adapter key lookups in seconds
pub const ADAPTER_KEY_TTL_SECONDS: u64 = 30;

#[derive(Debug, sqlx::FromRow)]
struct DemandSourceRow {
    id: i64,
    human_name: String,
    api_key: String,
}

fn to_resource(row: DemandSourceRow) -> DemandSource {
    DemandSource {
        id: row.id,
        attrs: DemandSourceAttrs {
            human_name: Some(row.human_name),
            api_key: Some(row.api_key),
        },
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, sqlx::Postgres>, scope: &ScopeFilter) {
    match scope {
        ScopeFilter::All => {}
        // Demand sources are not ownable.
        ScopeFilter::OwnedBy(_) | ScopeFilter::OwnedOrSharedBy(_) => {
            qb.push(" AND FALSE");
        }
    }
}

#[cached(
    time = 30,
    key = "i64",
    convert = r#"{ id }"#,
    result = true,
    sync_writes = true
)]
async fn load_adapter_key(pool: PgPool, id: i64) -> Result<Option<String>, String> {
    sqlx::query_scalar::<_, String>("SELECT api_key FROM demand_sources WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| format!("load demand source {}: {}", id, e))
}

pub struct DemandSourceRepo {
    pool: PgPool,
}

impl DemandSourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adapter key of a demand source, `None` when the id does not exist.
    pub async fn adapter_key(&self, id: i64) -> Result<Option<String>, AppError> {
        load_adapter_key(self.pool.clone(), id)
            .await
            .map_err(AppError::internal)
    }
}

#[async_trait]
impl ResourceRepo for DemandSourceRepo {
    type Resource = DemandSource;
    type Attrs = DemandSourceAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<DemandSource>, AppError> {
        let mut count_qb = QueryBuilder::new(COUNT_DEMAND_SOURCES);
        count_qb.push(" WHERE TRUE");
        push_scope(&mut count_qb, scope);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_DEMAND_SOURCES);
        qb.push(" WHERE TRUE");
        push_scope(&mut qb, scope);
        push_order_and_page(&mut qb, "d.id", params);

        let rows: Vec<DemandSourceRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<DemandSource, AppError> {
        let mut qb = QueryBuilder::new(SELECT_DEMAND_SOURCES);
        qb.push(" WHERE d.id = ");
        qb.push_bind(id);
        push_scope(&mut qb, scope);

        let row: DemandSourceRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &DemandSourceAttrs) -> Result<DemandSource, AppError> {
        let row: DemandSourceRow = sqlx::query_as(
            "INSERT INTO demand_sources (human_name, api_key) \
             VALUES ($1, $2) \
             RETURNING id, human_name, api_key",
        )
        .bind(attrs.human_name.clone().unwrap_or_default())
        .bind(attrs.api_key.clone().unwrap_or_default())
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &DemandSourceAttrs) -> Result<DemandSource, AppError> {
        let mut qb = QueryBuilder::new("UPDATE demand_sources SET updated_at = now()");
        if let Some(human_name) = &attrs.human_name {
            qb.push(", human_name = ");
            qb.push_bind(human_name);
        }
        if let Some(api_key) = &attrs.api_key {
            qb.push(", api_key = ");
            qb.push_bind(api_key);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING id, human_name, api_key");

        let row: DemandSourceRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM demand_sources WHERE id = $1")
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
