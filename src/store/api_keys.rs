//! API key repository. Keys are identified by UUIDv7 and always queried
//! through their owner, except for the authentication path which resolves a
//! parsed key id to its owner.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::admin::api_key::{ApiKeyFull, ApiKeyShort};
use crate::admin::resource::Collection;
use crate::error::AppError;
use crate::keys::api_key;
use crate::store::translate_db_error;

#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: Uuid,
    value: String,
    last_accessed_at: Option<DateTime<Utc>>,
}

/// Key row joined with its owner, used to build an auth context.
#[derive(Debug, FromRow)]
pub struct ApiKeyAccess {
    pub id: Uuid,
    pub user_id: i64,
    pub user_is_admin: Option<bool>,
}

pub struct ApiKeyRepo {
    pool: PgPool,
}

impl ApiKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_owned_by_user(
        &self,
        user_id: i64,
    ) -> Result<Collection<ApiKeyShort>, AppError> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            "SELECT id, value, last_accessed_at FROM api_keys WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(translate_db_error)?;

        let total_count = rows.len() as i64;
        let keys = rows
            .into_iter()
            .map(|row| ApiKeyShort {
                id: row.id.to_string(),
                last_accessed_at: row.last_accessed_at,
            })
            .collect();

        Ok(Collection::new(keys, total_count))
    }

    pub async fn find_owned_by_user(&self, user_id: i64, id: Uuid) -> Result<ApiKeyFull, AppError> {
        let row: ApiKeyRow = sqlx::query_as(
            "SELECT id, value, last_accessed_at FROM api_keys WHERE user_id = $1 AND id = $2",
        )
        .bind(user_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)?;

        Ok(ApiKeyFull {
            id: row.id.to_string(),
            value: row.value,
            last_accessed_at: row.last_accessed_at,
        })
    }

    /// Mint a key for a user: a fresh UUIDv7 identity wrapped in the
    /// checksum token format.
    pub async fn create(&self, user_id: i64) -> Result<ApiKeyFull, AppError> {
        let id = Uuid::now_v7();
        let value = api_key::new_api_key(id).map_err(AppError::Internal)?;

        let row: ApiKeyRow = sqlx::query_as(
            "INSERT INTO api_keys (id, value, user_id) VALUES ($1, $2, $3) \
             RETURNING id, value, last_accessed_at",
        )
        .bind(id)
        .bind(value)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)?;

        Ok(ApiKeyFull {
            id: row.id.to_string(),
            value: row.value,
            last_accessed_at: row.last_accessed_at,
        })
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(translate_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Fetch a key with its owner for authentication.
    pub async fn access(&self, id: Uuid) -> Result<ApiKeyAccess, AppError> {
        sqlx::query_as(
            "SELECT k.id, k.user_id, u.is_admin AS user_is_admin \
             FROM api_keys k INNER JOIN users u ON u.id = k.user_id \
             WHERE k.id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)
    }

    /// Record key usage. Callers treat failures as log-only.
    pub async fn touch(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_accessed_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(translate_db_error)?;
        Ok(())
    }
}
