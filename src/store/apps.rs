//! App repository. Rows join the owning user so resources come back with
//! the owner preloaded.

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::ad::Platform;
use crate::admin::app::{App, AppAttrs, AppSummary};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::user::User;
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::store::{int_param, push_order_and_page, translate_db_error};

const SELECT_APPS: &str = "SELECT a.id, a.user_id, a.platform_id, a.human_name, a.package_name, \
     a.app_key, a.settings, a.public_uid, \
     u.email AS user_email, u.is_admin AS user_is_admin, u.public_uid AS user_public_uid \
     FROM apps a INNER JOIN users u ON u.id = a.user_id";
const COUNT_APPS: &str = "SELECT COUNT(*) FROM apps a";

#[derive(Debug, FromRow)]
struct AppRow {
    id: i64,
    user_id: i64,
    platform_id: i16,
    human_name: String,
    package_name: Option<String>,
    app_key: Option<String>,
    settings: Json<Map<String, Value>>,
    public_uid: Option<i64>,
    user_email: String,
    user_is_admin: Option<bool>,
    user_public_uid: Option<i64>,
}

fn to_attrs(row: &AppRow) -> AppAttrs {
    AppAttrs {
        platform_id: Some(Platform::from_i16(row.platform_id)),
        human_name: Some(row.human_name.clone()),
        package_name: row.package_name.clone(),
        user_id: Some(row.user_id),
        app_key: row.app_key.clone(),
        settings: Some(row.settings.0.clone()),
    }
}

fn to_resource(row: AppRow) -> App {
    let attrs = to_attrs(&row);
    App {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        attrs,
        user: User {
            id: row.user_id,
            public_uid: row.user_public_uid.unwrap_or_default().to_string(),
            email: row.user_email,
            is_admin: row.user_is_admin,
        },
    }
}

#[derive(Debug, Default)]
struct AppFilters {
    user_id: Option<i64>,
}

impl AppFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            user_id: int_param(params, "user_id"),
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, sqlx::Postgres>, scope: &ScopeFilter, filters: &AppFilters) {
    match scope {
        ScopeFilter::All => {}
        ScopeFilter::OwnedBy(user_id) | ScopeFilter::OwnedOrSharedBy(user_id) => {
            qb.push(" AND a.user_id = ");
            qb.push_bind(*user_id);
        }
    }

    if let Some(user_id) = filters.user_id {
        qb.push(" AND a.user_id = ");
        qb.push_bind(user_id);
    }
}

fn generate_app_key() -> Result<String, AppError> {
    let mut key = [0u8; 24];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| AppError::internal(format!("generate app key: {e}")))?;
    Ok(hex::encode(key))
}

pub struct AppRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl AppRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<AppRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_APPS);
        qb.push(" WHERE a.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }
}

#[async_trait]
impl ResourceRepo for AppRepo {
    type Resource = App;
    type Attrs = AppAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<App>, AppError> {
        let filters = AppFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_APPS);
        count_qb.push(" WHERE TRUE");
        push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_APPS);
        qb.push(" WHERE TRUE");
        push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "a.id", params);

        let rows: Vec<AppRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<App, AppError> {
        let mut qb = QueryBuilder::new(SELECT_APPS);
        qb.push(" WHERE a.id = ");
        qb.push_bind(id);
        push_filters(&mut qb, scope, &AppFilters::default());

        let row: AppRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &AppAttrs) -> Result<App, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;
        let app_key = generate_app_key()?;

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO apps (user_id, platform_id, human_name, package_name, app_key, settings, public_uid) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(attrs.user_id.unwrap_or_default())
        .bind(attrs.platform_id.unwrap_or_default().as_i16())
        .bind(attrs.human_name.clone().unwrap_or_default())
        .bind(&attrs.package_name)
        .bind(app_key)
        .bind(Json(attrs.settings.clone().unwrap_or_default()))
        .bind(public_uid)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_error)?;

        let row = Self::fetch_one(&mut *tx, id).await?;
        tx.commit().await.map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &AppAttrs) -> Result<App, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new("UPDATE apps SET updated_at = now()");
        if let Some(user_id) = attrs.user_id {
            qb.push(", user_id = ");
            qb.push_bind(user_id);
        }
        if let Some(platform_id) = attrs.platform_id {
            qb.push(", platform_id = ");
            qb.push_bind(platform_id.as_i16());
        }
        if let Some(human_name) = &attrs.human_name {
            qb.push(", human_name = ");
            qb.push_bind(human_name);
        }
        if let Some(package_name) = &attrs.package_name {
            qb.push(", package_name = ");
            qb.push_bind(package_name);
        }
        if let Some(settings) = &attrs.settings {
            qb.push(", settings = ");
            qb.push_bind(Json(settings.clone()));
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
        let result = sqlx::query("DELETE FROM apps WHERE id = $1")
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

/// Build the embedded app representation from aliased `app_*` columns of a
/// joined row.
pub(crate) fn summary_from_parts(
    id: i64,
    platform_id: i16,
    human_name: String,
    package_name: Option<String>,
    user_id: i64,
    app_key: Option<String>,
) -> AppSummary {
    AppSummary {
        id,
        attrs: AppAttrs {
            platform_id: Some(Platform::from_i16(platform_id)),
            human_name: Some(human_name),
            package_name,
            user_id: Some(user_id),
            app_key,
            settings: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> AppRow {
        AppRow {
            id: 11,
            user_id: 7,
            platform_id: 1,
            human_name: "Word Game".into(),
            package_name: None,
            app_key: Some("abc123".into()),
            settings: Json(Map::new()),
            public_uid: Some(1_234_567),
            user_email: "dev@apps.test".into(),
            user_is_admin: Some(false),
            user_public_uid: Some(42),
        }
    }

    #[test]
    fn test_row_mapping_preserves_absent_values() {
        let app = to_resource(sample_row());

        assert_eq!(app.id, 11);
        assert_eq!(app.public_uid, "1234567");
        assert_eq!(app.attrs.platform_id, Some(Platform::Ios));
        // Absent stays absent, it does not become an empty string.
        assert_eq!(app.attrs.package_name, None);
        assert_eq!(app.user.email, "dev@apps.test");
    }

    #[test]
    fn test_row_mapping_keeps_empty_string_distinct_from_null() {
        let mut row = sample_row();
        row.package_name = Some(String::new());
        let app = to_resource(row);
        assert_eq!(app.attrs.package_name, Some(String::new()));
    }

    #[test]
    fn test_generated_app_key_shape() {
        let key = generate_app_key().unwrap();
        assert_eq!(key.len(), 48); // 24 bytes, hex-encoded
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
