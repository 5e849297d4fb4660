//! Auction configuration repository.
//!
//! v1 and v2 configurations share one table; a `"v2": true` marker inside
//! the `settings` JSON map tells them apart, and each repository instance
//! serves exactly one side of that split.
//!
//! The `(app_id, ad_type, segment_id, v2)` uniqueness invariant (null
//! `segment_id` is its own bucket) is enforced inside the write
//! transaction, serialized by an advisory lock on `(app_id, ad_type)` so
//! two concurrent writers cannot both pass the count.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::ad::AdType;
use crate::admin::auction_configuration::{AuctionConfiguration, AuctionConfigurationAttrs};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::segment::SegmentSummary;
use crate::error::AppError;
use crate::keys::{SnowflakeNode, auction_key};
use crate::store::{apps, bool_param, int_param, push_order_and_page, translate_db_error};

const V2_MARKER: &str = "v2";

const SELECT_CONFIGS: &str = "SELECT c.id, c.app_id, c.name, c.ad_type, c.pricefloor, c.segment_id, \
     c.external_win_notifications, c.demands, c.bidding, c.ad_unit_ids, c.timeout, \
     c.settings, c.is_default, c.public_uid, c.auction_key, \
     a.platform_id AS app_platform_id, a.human_name AS app_human_name, \
     a.package_name AS app_package_name, a.user_id AS app_user_id, a.app_key AS app_app_key, \
     g.name AS segment_name \
     FROM auction_configurations c \
     INNER JOIN apps a ON a.id = c.app_id \
     LEFT JOIN segments g ON g.id = c.segment_id";
const COUNT_CONFIGS: &str =
    "SELECT COUNT(*) FROM auction_configurations c INNER JOIN apps a ON a.id = c.app_id";

#[derive(Debug, FromRow)]
struct ConfigRow {
    id: i64,
    app_id: i64,
    name: Option<String>,
    ad_type: i16,
    pricefloor: f64,
    segment_id: Option<i64>,
    external_win_notifications: Option<bool>,
    demands: Vec<String>,
    bidding: Vec<String>,
    ad_unit_ids: Vec<i64>,
    timeout: i32,
    settings: Json<Map<String, Value>>,
    is_default: Option<bool>,
    public_uid: Option<i64>,
    auction_key: Option<String>,
    app_platform_id: i16,
    app_human_name: String,
    app_package_name: Option<String>,
    app_user_id: i64,
    app_app_key: Option<String>,
    segment_name: Option<String>,
}

fn to_resource(row: ConfigRow) -> AuctionConfiguration {
    let segment = row.segment_id.map(|id| SegmentSummary {
        id,
        name: row.segment_name.clone(),
    });

    AuctionConfiguration {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        auction_key: row.auction_key,
        attrs: AuctionConfigurationAttrs {
            name: row.name,
            app_id: Some(row.app_id),
            ad_type: AdType::from_i16(row.ad_type),
            pricefloor: Some(row.pricefloor),
            segment_id: row.segment_id,
            external_win_notifications: row.external_win_notifications,
            demands: Some(row.demands),
            bidding: Some(row.bidding),
            ad_unit_ids: Some(row.ad_unit_ids),
            timeout: Some(row.timeout),
            settings: Some(row.settings.0),
            is_default: row.is_default,
        },
        app: apps::summary_from_parts(
            row.app_id,
            row.app_platform_id,
            row.app_human_name,
            row.app_package_name,
            row.app_user_id,
            row.app_app_key,
        ),
        segment,
    }
}

/// Settings map to persist. The v2 marker is the version discriminator,
/// not caller data: v2 rows always carry it, v1 rows never do. All other
/// keys pass through untouched.
fn settings_for_write(v2: bool, settings: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut settings = settings.cloned().unwrap_or_default();
    if v2 {
        settings.insert(V2_MARKER.to_string(), Value::Bool(true));
    } else {
        settings.remove(V2_MARKER);
    }
    settings
}

#[derive(Debug, Default)]
struct ConfigFilters {
    user_id: Option<i64>,
    app_id: Option<i64>,
    ad_type: Option<AdType>,
    segment_id: Option<i64>,
    is_default: Option<bool>,
    name: Option<String>,
}

impl ConfigFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            user_id: int_param(params, "user_id"),
            app_id: int_param(params, "app_id"),
            ad_type: params.get("ad_type").and_then(|v| AdType::from_param(v)),
            segment_id: int_param(params, "segment_id"),
            is_default: bool_param(params, "is_default"),
            name: params.get("name").cloned(),
        }
    }
}

pub struct AuctionConfigurationRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
    v2: bool,
}

impl AuctionConfigurationRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>, v2: bool) -> Self {
        Self {
            pool,
            snowflake,
            v2,
        }
    }

    fn push_v2_marker(&self, qb: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if self.v2 {
            qb.push(" AND c.settings->>'v2' = 'true'");
        } else {
            qb.push(" AND c.settings->>'v2' IS NULL");
        }
    }

    fn push_filters(
        &self,
        qb: &mut QueryBuilder<'_, sqlx::Postgres>,
        scope: &ScopeFilter,
        filters: &ConfigFilters,
    ) {
        self.push_v2_marker(qb);

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
        if let Some(app_id) = filters.app_id {
            qb.push(" AND c.app_id = ");
            qb.push_bind(app_id);
        }
        if let Some(ad_type) = filters.ad_type {
            qb.push(" AND c.ad_type = ");
            qb.push_bind(ad_type.as_i16());
        }
        if let Some(segment_id) = filters.segment_id {
            qb.push(" AND c.segment_id = ");
            qb.push_bind(segment_id);
        }
        if let Some(is_default) = filters.is_default {
            qb.push(" AND c.is_default = ");
            qb.push_bind(is_default);
        }
        if let Some(name) = &filters.name {
            qb.push(" AND c.name ILIKE ");
            qb.push_bind(format!("%{}%", name));
        }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<ConfigRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_CONFIGS);
        qb.push(" WHERE c.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }

    /// Serialize writers of one `(app_id, ad_type)` slice for the rest of
    /// the transaction, then count rows that would collide on
    /// `(app_id, ad_type, segment_id, v2)`. Null segment ids collide with
    /// each other. `exclude_id` skips the row being updated.
    async fn check_uniqueness(
        &self,
        conn: &mut PgConnection,
        app_id: i64,
        ad_type: i16,
        segment_id: Option<i64>,
        exclude_id: i64,
    ) -> Result<(), AppError> {
        let lock_key =
            crc32fast::hash(format!("auction_configurations:{}:{}", app_id, ad_type).as_bytes());
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(lock_key as i64)
            .execute(&mut *conn)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM auction_configurations c WHERE c.app_id = ",
        );
        qb.push_bind(app_id);
        qb.push(" AND c.ad_type = ");
        qb.push_bind(ad_type);
        match segment_id {
            Some(segment_id) => {
                qb.push(" AND c.segment_id = ");
                qb.push_bind(segment_id);
            }
            None => {
                qb.push(" AND c.segment_id IS NULL");
            }
        }
        self.push_v2_marker(&mut qb);
        qb.push(" AND c.id <> ");
        qb.push_bind(exclude_id);

        let conflicts: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(translate_db_error)?;

        if conflicts > 0 {
            return Err(AppError::conflict(
                "the combination of app_id, ad_type, and segment_id already exists",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepo for AuctionConfigurationRepo {
    type Resource = AuctionConfiguration;
    type Attrs = AuctionConfigurationAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<AuctionConfiguration>, AppError> {
        let filters = ConfigFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_CONFIGS);
        count_qb.push(" WHERE TRUE");
        self.push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_CONFIGS);
        qb.push(" WHERE TRUE");
        self.push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "c.id", params);

        let rows: Vec<ConfigRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<AuctionConfiguration, AppError> {
        let mut qb = QueryBuilder::new(SELECT_CONFIGS);
        qb.push(" WHERE c.id = ");
        qb.push_bind(id);
        self.push_filters(&mut qb, scope, &ConfigFilters::default());

        let row: ConfigRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(
        &self,
        attrs: &AuctionConfigurationAttrs,
    ) -> Result<AuctionConfiguration, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;
        let auction_key = auction_key::derive(public_uid);

        let app_id = attrs.app_id.unwrap_or_default();
        let ad_type = attrs.ad_type.map(AdType::as_i16).unwrap_or_default();
        let settings = settings_for_write(self.v2, attrs.settings.as_ref());

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        self.check_uniqueness(&mut tx, app_id, ad_type, attrs.segment_id, 0)
            .await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO auction_configurations \
             (app_id, name, ad_type, pricefloor, segment_id, external_win_notifications, \
              demands, bidding, ad_unit_ids, timeout, settings, is_default, public_uid, auction_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
        )
        .bind(app_id)
        .bind(&attrs.name)
        .bind(ad_type)
        .bind(attrs.pricefloor.unwrap_or_default())
        .bind(attrs.segment_id)
        .bind(attrs.external_win_notifications)
        .bind(attrs.demands.clone().unwrap_or_default())
        .bind(attrs.bidding.clone().unwrap_or_default())
        .bind(attrs.ad_unit_ids.clone().unwrap_or_default())
        .bind(attrs.timeout.unwrap_or_default())
        .bind(Json(settings))
        .bind(attrs.is_default)
        .bind(public_uid)
        .bind(auction_key)
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
        attrs: &AuctionConfigurationAttrs,
    ) -> Result<AuctionConfiguration, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let existing: Option<(i64, i16, Option<i64>)> = sqlx::query_as(
            "SELECT app_id, ad_type, segment_id FROM auction_configurations \
             WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(translate_db_error)?;
        let (current_app_id, current_ad_type, current_segment_id) =
            existing.ok_or(AppError::NotFound)?;

        let app_id = attrs.app_id.unwrap_or(current_app_id);
        let ad_type = attrs.ad_type.map(AdType::as_i16).unwrap_or(current_ad_type);
        let segment_id = attrs.segment_id.or(current_segment_id);

        self.check_uniqueness(&mut tx, app_id, ad_type, segment_id, id)
            .await?;

        let mut qb = QueryBuilder::new("UPDATE auction_configurations SET updated_at = now()");
        if let Some(app_id) = attrs.app_id {
            qb.push(", app_id = ");
            qb.push_bind(app_id);
        }
        if let Some(name) = &attrs.name {
            qb.push(", name = ");
            qb.push_bind(name);
        }
        if let Some(ad_type) = attrs.ad_type {
            qb.push(", ad_type = ");
            qb.push_bind(ad_type.as_i16());
        }
        if let Some(pricefloor) = attrs.pricefloor {
            qb.push(", pricefloor = ");
            qb.push_bind(pricefloor);
        }
        if let Some(segment_id) = attrs.segment_id {
            qb.push(", segment_id = ");
            qb.push_bind(segment_id);
        }
        if let Some(external_win_notifications) = attrs.external_win_notifications {
            qb.push(", external_win_notifications = ");
            qb.push_bind(external_win_notifications);
        }
        if let Some(demands) = &attrs.demands {
            qb.push(", demands = ");
            qb.push_bind(demands.clone());
        }
        if let Some(bidding) = &attrs.bidding {
            qb.push(", bidding = ");
            qb.push_bind(bidding.clone());
        }
        if let Some(ad_unit_ids) = &attrs.ad_unit_ids {
            qb.push(", ad_unit_ids = ");
            qb.push_bind(ad_unit_ids.clone());
        }
        if let Some(timeout) = attrs.timeout {
            qb.push(", timeout = ");
            qb.push_bind(timeout);
        }
        if let Some(settings) = &attrs.settings {
            qb.push(", settings = ");
            qb.push_bind(Json(settings_for_write(self.v2, Some(settings))));
        }
        if let Some(is_default) = attrs.is_default {
            qb.push(", is_default = ");
            qb.push_bind(is_default);
        }
        // public_uid and auction_key are immutable after create.
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
        let result = sqlx::query("DELETE FROM auction_configurations WHERE id = $1")
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> ConfigRow {
        ConfigRow {
            id: 3,
            app_id: 1,
            name: Some("default banner".into()),
            ad_type: 1,
            pricefloor: 0.25,
            segment_id: None,
            external_win_notifications: None,
            demands: vec!["applovin".into(), "bidmachine".into()],
            bidding: vec!["bidmachine".into()],
            ad_unit_ids: vec![101, 102],
            timeout: 30_000,
            settings: Json(
                json!({"v2": true, "custom": "kept"})
                    .as_object()
                    .unwrap()
                    .clone(),
            ),
            is_default: Some(true),
            public_uid: Some(1_000_000),
            auction_key: Some("UGI0".into()),
            app_platform_id: 2,
            app_human_name: "Word Game".into(),
            app_package_name: Some("com.example.word".into()),
            app_user_id: 7,
            app_app_key: None,
            segment_name: None,
        }
    }

    #[test]
    fn test_row_mapping() {
        let config = to_resource(sample_row());

        assert_eq!(config.public_uid, "1000000");
        assert_eq!(config.auction_key.as_deref(), Some("UGI0"));
        assert_eq!(config.attrs.ad_type, Some(AdType::Banner));
        assert_eq!(config.attrs.segment_id, None);
        assert!(config.segment.is_none());
        assert_eq!(config.attrs.demands.as_deref().unwrap().len(), 2);
        // Unknown settings keys pass through untouched.
        assert_eq!(
            config.attrs.settings.unwrap().get("custom"),
            Some(&json!("kept"))
        );
        assert_eq!(config.app.attrs.user_id, Some(7));
    }

    #[test]
    fn test_row_mapping_with_segment() {
        let mut row = sample_row();
        row.segment_id = Some(9);
        row.segment_name = Some("whales".into());

        let config = to_resource(row);
        let segment = config.segment.unwrap();
        assert_eq!(segment.id, 9);
        assert_eq!(segment.name.as_deref(), Some("whales"));
    }

    #[test]
    fn test_settings_marker_discipline() {
        let mut settings = Map::new();
        settings.insert("custom".into(), json!("kept"));

        // The v2 repo injects the marker; the v1 repo strips it.
        let mut with_marker = settings.clone();
        with_marker.insert(V2_MARKER.into(), Value::Bool(true));

        assert_eq!(settings_for_write(true, Some(&settings)), with_marker);
        assert_eq!(settings_for_write(false, Some(&with_marker)), settings);
        assert!(settings_for_write(false, None).is_empty());
        assert_eq!(
            settings_for_write(true, None).get(V2_MARKER),
            Some(&Value::Bool(true))
        );
    }
}
