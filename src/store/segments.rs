//! Segment repository. Owned through the app; the filter clauses are kept
//! as a JSONB array in declaration order.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::ad::SegmentFilter;
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::segment::{Segment, SegmentAttrs};
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::store::{apps, int_param, push_order_and_page, translate_db_error};

const SELECT_SEGMENTS: &str = "SELECT g.id, g.app_id, g.name, g.description, g.filters, g.enabled, g.priority, \
     g.public_uid, \
     a.platform_id AS app_platform_id, a.human_name AS app_human_name, \
     a.package_name AS app_package_name, a.user_id AS app_user_id, a.app_key AS app_app_key \
     FROM segments g INNER JOIN apps a ON a.id = g.app_id";
const COUNT_SEGMENTS: &str = "SELECT COUNT(*) FROM segments g INNER JOIN apps a ON a.id = g.app_id";

#[derive(Debug, FromRow)]
struct SegmentRow {
    id: i64,
    app_id: i64,
    name: String,
    description: String,
    filters: Json<Vec<SegmentFilter>>,
    enabled: Option<bool>,
    priority: i32,
    public_uid: Option<i64>,
    app_platform_id: i16,
    app_human_name: String,
    app_package_name: Option<String>,
    app_user_id: i64,
    app_app_key: Option<String>,
}

fn to_resource(row: SegmentRow) -> Segment {
    Segment {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        attrs: SegmentAttrs {
            name: Some(row.name),
            description: Some(row.description),
            filters: Some(row.filters.0),
            enabled: row.enabled,
            app_id: Some(row.app_id),
            priority: Some(row.priority),
        },
        app: apps::summary_from_parts(
            row.app_id,
            row.app_platform_id,
            row.app_human_name,
            row.app_package_name,
            row.app_user_id,
            row.app_app_key,
        ),
    }
}

#[derive(Debug, Default)]
struct SegmentFilters {
    app_id: Option<i64>,
}

impl SegmentFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            app_id: int_param(params, "app_id"),
        }
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, sqlx::Postgres>,
    scope: &ScopeFilter,
    filters: &SegmentFilters,
) {
    match scope {
        ScopeFilter::All => {}
        ScopeFilter::OwnedBy(user_id) | ScopeFilter::OwnedOrSharedBy(user_id) => {
            qb.push(" AND a.user_id = ");
            qb.push_bind(*user_id);
        }
    }

    if let Some(app_id) = filters.app_id {
        qb.push(" AND g.app_id = ");
        qb.push_bind(app_id);
    }
}

pub struct SegmentRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl SegmentRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<SegmentRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_SEGMENTS);
        qb.push(" WHERE g.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }
}

#[async_trait]
impl ResourceRepo for SegmentRepo {
    type Resource = Segment;
    type Attrs = SegmentAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<Segment>, AppError> {
        let filters = SegmentFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_SEGMENTS);
        count_qb.push(" WHERE TRUE");
        push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_SEGMENTS);
        qb.push(" WHERE TRUE");
        push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "g.id", params);

        let rows: Vec<SegmentRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<Segment, AppError> {
        let mut qb = QueryBuilder::new(SELECT_SEGMENTS);
        qb.push(" WHERE g.id = ");
        qb.push_bind(id);
        push_filters(&mut qb, scope, &SegmentFilters::default());

        let row: SegmentRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &SegmentAttrs) -> Result<Segment, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO segments (app_id, name, description, filters, enabled, priority, public_uid) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(attrs.app_id.unwrap_or_default())
        .bind(attrs.name.clone().unwrap_or_default())
        .bind(attrs.description.clone().unwrap_or_default())
        .bind(Json(attrs.filters.clone().unwrap_or_default()))
        .bind(attrs.enabled)
        .bind(attrs.priority.unwrap_or_default())
        .bind(public_uid)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_error)?;

        let row = Self::fetch_one(&mut *tx, id).await?;
        tx.commit().await.map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &SegmentAttrs) -> Result<Segment, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new("UPDATE segments SET updated_at = now()");
        if let Some(app_id) = attrs.app_id {
            qb.push(", app_id = ");
            qb.push_bind(app_id);
        }
        if let Some(name) = &attrs.name {
            qb.push(", name = ");
            qb.push_bind(name);
        }
        if let Some(description) = &attrs.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(filters) = &attrs.filters {
            qb.push(", filters = ");
            qb.push_bind(Json(filters.clone()));
        }
        if let Some(enabled) = attrs.enabled {
            qb.push(", enabled = ");
            qb.push_bind(enabled);
        }
        if let Some(priority) = attrs.priority {
            qb.push(", priority = ");
            qb.push_bind(priority);
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
        let result = sqlx::query("DELETE FROM segments WHERE id = $1")
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
