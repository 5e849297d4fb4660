//! Country repository.

use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::postgres::PgPool;

use crate::admin::country::{Country, CountryAttrs};
use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::error::AppError;
use crate::store::{push_order_and_page, translate_db_error};

const SELECT_COUNTRIES: &str =
    "SELECT c.id, c.human_name, c.alpha2_code, c.alpha3_code FROM countries c";
const COUNT_COUNTRIES: &str = "SELECT COUNT(*) FROM countries c";

#[derive(Debug, sqlx::FromRow)]
struct CountryRow {
    id: i64,
    human_name: Option<String>,
    alpha2_code: String,
    alpha3_code: String,
}

fn to_resource(row: CountryRow) -> Country {
    Country {
        id: row.id,
        attrs: CountryAttrs {
            human_name: row.human_name,
            alpha2_code: Some(row.alpha2_code),
            alpha3_code: Some(row.alpha3_code),
        },
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, sqlx::Postgres>, scope: &ScopeFilter) {
    match scope {
        ScopeFilter::All => {}
        // Countries are not ownable.
        ScopeFilter::OwnedBy(_) | ScopeFilter::OwnedOrSharedBy(_) => {
            qb.push(" AND FALSE");
        }
    }
}

pub struct CountryRepo {
    pool: PgPool,
}

impl CountryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceRepo for CountryRepo {
    type Resource = Country;
    type Attrs = CountryAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<Country>, AppError> {
        let mut count_qb = QueryBuilder::new(COUNT_COUNTRIES);
        count_qb.push(" WHERE TRUE");
        push_scope(&mut count_qb, scope);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_COUNTRIES);
        qb.push(" WHERE TRUE");
        push_scope(&mut qb, scope);
        push_order_and_page(&mut qb, "c.id", params);

        let rows: Vec<CountryRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<Country, AppError> {
        let mut qb = QueryBuilder::new(SELECT_COUNTRIES);
        qb.push(" WHERE c.id = ");
        qb.push_bind(id);
        push_scope(&mut qb, scope);

        let row: CountryRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &CountryAttrs) -> Result<Country, AppError> {
        let row: CountryRow = sqlx::query_as(
            "INSERT INTO countries (human_name, alpha2_code, alpha3_code) \
             VALUES ($1, $2, $3) \
             RETURNING id, human_name, alpha2_code, alpha3_code",
        )
        .bind(&attrs.human_name)
        .bind(attrs.alpha2_code.clone().unwrap_or_default())
        .bind(attrs.alpha3_code.clone().unwrap_or_default())
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &CountryAttrs) -> Result<Country, AppError> {
        let mut qb = QueryBuilder::new("UPDATE countries SET updated_at = now()");
        if let Some(human_name) = &attrs.human_name {
            qb.push(", human_name = ");
            qb.push_bind(human_name);
        }
        if let Some(alpha2_code) = &attrs.alpha2_code {
            qb.push(", alpha2_code = ");
            qb.push_bind(alpha2_code);
        }
        if let Some(alpha3_code) = &attrs.alpha3_code {
            qb.push(", alpha3_code = ");
            qb.push_bind(alpha3_code);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING id, human_name, alpha2_code, alpha3_code");

        let row: CountryRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM countries WHERE id = $1")
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
