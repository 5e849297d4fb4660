//! Line item repository. Owned through the app; filterable by most of its
//! columns for the line item management UI.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, QueryBuilder};
use std::sync::Arc;

use crate::ad::{AdType, LineItemFormat};
use crate::admin::line_item::{LineItem, LineItemAttrs};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::store::{
    apps, bool_param, demand_source_accounts, int_param, push_order_and_page, translate_db_error,
};

const SELECT_LINE_ITEMS: &str = "SELECT i.id, i.app_id, i.account_id, i.account_type, i.human_name, i.code, \
     i.bid_floor, i.ad_type, i.format, i.bidding, i.extra, i.public_uid, \
     a.platform_id AS app_platform_id, a.human_name AS app_human_name, \
     a.package_name AS app_package_name, a.user_id AS app_user_id, a.app_key AS app_app_key, \
     s.user_id AS account_user_id, s.demand_source_id AS account_demand_source_id, \
     s.label AS account_label, s.type AS account_type_name, \
     s.is_bidding AS account_is_bidding, s.is_default AS account_is_default, \
     s.extra AS account_extra \
     FROM line_items i \
     INNER JOIN apps a ON a.id = i.app_id \
     INNER JOIN demand_source_accounts s ON s.id = i.account_id";
const COUNT_LINE_ITEMS: &str =
    "SELECT COUNT(*) FROM line_items i INNER JOIN apps a ON a.id = i.app_id";

#[derive(Debug, FromRow)]
struct LineItemRow {
    id: i64,
    app_id: i64,
    account_id: i64,
    account_type: String,
    human_name: String,
    code: Option<String>,
    bid_floor: Option<Decimal>,
    ad_type: i16,
    format: Option<String>,
    bidding: Option<bool>,
    extra: Json<Map<String, Value>>,
    public_uid: Option<i64>,
    app_platform_id: i16,
    app_human_name: String,
    app_package_name: Option<String>,
    app_user_id: i64,
    app_app_key: Option<String>,
    account_user_id: i64,
    account_demand_source_id: i64,
    account_label: Option<String>,
    account_type_name: String,
    account_is_bidding: Option<bool>,
    account_is_default: Option<bool>,
    account_extra: Json<Map<String, Value>>,
}

fn to_resource(row: LineItemRow) -> LineItem {
    LineItem {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        attrs: LineItemAttrs {
            human_name: Some(row.human_name),
            app_id: Some(row.app_id),
            bid_floor: row.bid_floor,
            ad_type: AdType::from_i16(row.ad_type),
            format: row.format.as_deref().and_then(LineItemFormat::from_str_opt),
            account_id: Some(row.account_id),
            account_type: Some(row.account_type),
            code: row.code,
            is_bidding: row.bidding,
            extra: Some(row.extra.0),
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
            row.account_demand_source_id,
            row.account_label,
            row.account_type_name,
            row.account_is_bidding,
            row.account_is_default,
            row.account_extra.0,
        ),
    }
}

#[derive(Debug, Default)]
struct LineItemFilters {
    user_id: Option<i64>,
    app_id: Option<i64>,
    ad_type: Option<AdType>,
    account_id: Option<i64>,
    account_type: Option<String>,
    is_bidding: Option<bool>,
}

impl LineItemFilters {
    fn from_query_params(params: &QueryParams) -> Self {
        Self {
            user_id: int_param(params, "user_id"),
            app_id: int_param(params, "app_id"),
            ad_type: params.get("ad_type").and_then(|v| AdType::from_param(v)),
            account_id: int_param(params, "account_id"),
            account_type: params.get("account_type").cloned(),
            is_bidding: bool_param(params, "is_bidding"),
        }
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, sqlx::Postgres>,
    scope: &ScopeFilter,
    filters: &LineItemFilters,
) {
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
        qb.push(" AND i.app_id = ");
        qb.push_bind(app_id);
    }
    if let Some(ad_type) = filters.ad_type {
        qb.push(" AND i.ad_type = ");
        qb.push_bind(ad_type.as_i16());
    }
    if let Some(account_id) = filters.account_id {
        qb.push(" AND i.account_id = ");
        qb.push_bind(account_id);
    }
    if let Some(account_type) = &filters.account_type {
        qb.push(" AND i.account_type = ");
        qb.push_bind(account_type.clone());
    }
    if let Some(is_bidding) = filters.is_bidding {
        if is_bidding {
            qb.push(" AND i.bidding = TRUE");
        } else {
            qb.push(" AND (i.bidding = FALSE OR i.bidding IS NULL)");
        }
    }
}

pub struct LineItemRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl LineItemRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    async fn fetch_one<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<LineItemRow, AppError> {
        let mut qb = QueryBuilder::new(SELECT_LINE_ITEMS);
        qb.push(" WHERE i.id = ");
        qb.push_bind(id);

        qb.build_query_as()
            .fetch_one(executor)
            .await
            .map_err(translate_db_error)
    }
}

#[async_trait]
impl ResourceRepo for LineItemRepo {
    type Resource = LineItem;
    type Attrs = LineItemAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<LineItem>, AppError> {
        let filters = LineItemFilters::from_query_params(params);

        let mut count_qb = QueryBuilder::new(COUNT_LINE_ITEMS);
        count_qb.push(" WHERE TRUE");
        push_filters(&mut count_qb, scope, &filters);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_LINE_ITEMS);
        qb.push(" WHERE TRUE");
        push_filters(&mut qb, scope, &filters);
        push_order_and_page(&mut qb, "i.id", params);

        let rows: Vec<LineItemRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<LineItem, AppError> {
        let mut qb = QueryBuilder::new(SELECT_LINE_ITEMS);
        qb.push(" WHERE i.id = ");
        qb.push_bind(id);
        push_filters(&mut qb, scope, &LineItemFilters::default());

        let row: LineItemRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &LineItemAttrs) -> Result<LineItem, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO line_items \
             (app_id, account_id, account_type, human_name, code, bid_floor, ad_type, format, bidding, extra, public_uid) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
        )
        .bind(attrs.app_id.unwrap_or_default())
        .bind(attrs.account_id.unwrap_or_default())
        .bind(attrs.account_type.clone().unwrap_or_default())
        .bind(attrs.human_name.clone().unwrap_or_default())
        .bind(&attrs.code)
        .bind(attrs.bid_floor)
        .bind(attrs.ad_type.map(AdType::as_i16).unwrap_or_default())
        .bind(attrs.format.map(LineItemFormat::as_str))
        .bind(attrs.is_bidding)
        .bind(Json(attrs.extra.clone().unwrap_or_default()))
        .bind(public_uid)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_error)?;

        let row = Self::fetch_one(&mut *tx, id).await?;
        tx.commit().await.map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &LineItemAttrs) -> Result<LineItem, AppError> {
        let mut tx = self.pool.begin().await.map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new("UPDATE line_items SET updated_at = now()");
        if let Some(app_id) = attrs.app_id {
            qb.push(", app_id = ");
            qb.push_bind(app_id);
        }
        if let Some(account_id) = attrs.account_id {
            qb.push(", account_id = ");
            qb.push_bind(account_id);
        }
        if let Some(account_type) = &attrs.account_type {
            qb.push(", account_type = ");
            qb.push_bind(account_type);
        }
        if let Some(human_name) = &attrs.human_name {
            qb.push(", human_name = ");
            qb.push_bind(human_name);
        }
        if let Some(code) = &attrs.code {
            qb.push(", code = ");
            qb.push_bind(code);
        }
        if let Some(bid_floor) = attrs.bid_floor {
            qb.push(", bid_floor = ");
            qb.push_bind(bid_floor);
        }
        if let Some(ad_type) = attrs.ad_type {
            qb.push(", ad_type = ");
            qb.push_bind(ad_type.as_i16());
        }
        if let Some(format) = attrs.format {
            qb.push(", format = ");
            qb.push_bind(format.as_str());
        }
        if let Some(is_bidding) = attrs.is_bidding {
            qb.push(", bidding = ");
            qb.push_bind(is_bidding);
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
        let result = sqlx::query("DELETE FROM line_items WHERE id = $1")
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

    fn sample_row() -> LineItemRow {
        LineItemRow {
            id: 21,
            app_id: 1,
            account_id: 5,
            account_type: "DemandSourceAccount::Applovin".into(),
            human_name: "applovin banner $0.5".into(),
            code: None,
            bid_floor: Some(Decimal::new(5, 1)),
            ad_type: 1,
            format: Some("MREC".into()),
            bidding: None,
            extra: Json(Map::new()),
            public_uid: Some(88),
            app_platform_id: 1,
            app_human_name: "Word Game".into(),
            app_package_name: None,
            app_user_id: 7,
            app_app_key: None,
            account_user_id: 7,
            account_demand_source_id: 2,
            account_label: Some("main".into()),
            account_type_name: "DemandSourceAccount::Applovin".into(),
            account_is_bidding: Some(false),
            account_is_default: None,
            account_extra: Json(Map::new()),
        }
    }

    #[test]
    fn test_row_mapping() {
        let line_item = to_resource(sample_row());

        assert_eq!(line_item.public_uid, "88");
        assert_eq!(line_item.attrs.ad_type, Some(AdType::Banner));
        assert_eq!(line_item.attrs.format, Some(LineItemFormat::Mrec));
        assert_eq!(line_item.attrs.bid_floor, Some(Decimal::new(5, 1)));
        // Nullable cells keep their absence.
        assert_eq!(line_item.attrs.code, None);
        assert_eq!(line_item.attrs.is_bidding, None);
        assert_eq!(line_item.account.attrs.label.as_deref(), Some("main"));
    }

    #[test]
    fn test_unknown_format_degrades_to_none() {
        let mut row = sample_row();
        row.format = Some("HOLOGRAM".into());
        assert_eq!(to_resource(row).attrs.format, None);
    }

    #[test]
    fn test_filter_parsing_ignores_invalid_values() {
        let params: QueryParams = [
            ("app_id".to_string(), "7".to_string()),
            ("ad_type".to_string(), "hologram".to_string()),
            ("is_bidding".to_string(), "true".to_string()),
            ("unknown_key".to_string(), "ignored".to_string()),
        ]
        .into_iter()
        .collect();

        let filters = LineItemFilters::from_query_params(&params);
        assert_eq!(filters.app_id, Some(7));
        assert_eq!(filters.ad_type, None);
        assert_eq!(filters.is_bidding, Some(true));
        assert_eq!(filters.user_id, None);
    }
}
