//! User repository.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, QueryBuilder};
use std::sync::Arc;

use crate::admin::resource::{Collection, QueryParams, ResourceRepo};
use crate::admin::scopes::ScopeFilter;
use crate::admin::user::{User, UserAttrs};
use crate::error::AppError;
use crate::keys::SnowflakeNode;
use crate::password;
use crate::store::{push_order_and_page, translate_db_error};

const SELECT_USERS: &str =
    "SELECT u.id, u.email, u.is_admin, u.public_uid FROM users u";
const COUNT_USERS: &str = "SELECT COUNT(*) FROM users u";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    is_admin: Option<bool>,
    public_uid: Option<i64>,
}

/// Credential row used by the authentication service.
#[derive(Debug, FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_admin: Option<bool>,
}

fn to_resource(row: UserRow) -> User {
    User {
        id: row.id,
        public_uid: row.public_uid.unwrap_or_default().to_string(),
        email: row.email,
        is_admin: row.is_admin,
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, sqlx::Postgres>, scope: &ScopeFilter) {
    match scope {
        ScopeFilter::All => {}
        // Users have no owner; narrowed scopes can never match.
        ScopeFilter::OwnedBy(_) | ScopeFilter::OwnedOrSharedBy(_) => {
            qb.push(" AND FALSE");
        }
    }
}

pub struct UserRepo {
    pool: PgPool,
    snowflake: Arc<SnowflakeNode>,
}

impl UserRepo {
    pub fn new(pool: PgPool, snowflake: Arc<SnowflakeNode>) -> Self {
        Self { pool, snowflake }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AppError> {
        sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, password_hash, is_admin FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate_db_error)
    }

    /// Verify the current password and store a hash of the new one.
    pub async fn update_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(translate_db_error)?;
        let stored = stored.ok_or(AppError::NotFound)?;

        let matches = password::verify_password(&stored, current_password)
            .map_err(|e| AppError::Internal(e.into()))?;
        if !matches {
            return Err(AppError::forbidden("current password is incorrect"));
        }

        let new_hash =
            password::hash_password(new_password).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(new_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(())
    }
}

#[async_trait]
impl ResourceRepo for UserRepo {
    type Resource = User;
    type Attrs = UserAttrs;

    async fn list(
        &self,
        scope: &ScopeFilter,
        params: &QueryParams,
    ) -> Result<Collection<User>, AppError> {
        let mut count_qb = QueryBuilder::new(COUNT_USERS);
        count_qb.push(" WHERE TRUE");
        push_scope(&mut count_qb, scope);
        let total_count: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        let mut qb = QueryBuilder::new(SELECT_USERS);
        qb.push(" WHERE TRUE");
        push_scope(&mut qb, scope);
        push_order_and_page(&mut qb, "u.id", params);

        let rows: Vec<UserRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(Collection::new(
            rows.into_iter().map(to_resource).collect(),
            total_count,
        ))
    }

    async fn find(&self, scope: &ScopeFilter, id: i64) -> Result<User, AppError> {
        let mut qb = QueryBuilder::new(SELECT_USERS);
        qb.push(" WHERE u.id = ");
        qb.push_bind(id);
        push_scope(&mut qb, scope);

        let row: UserRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn create(&self, attrs: &UserAttrs) -> Result<User, AppError> {
        let public_uid = self
            .snowflake
            .generate()
            .map_err(|e| AppError::Internal(e.into()))?;

        let password_hash = match attrs.password.as_deref() {
            Some(password) if !password.is_empty() => {
                password::hash_password(password).map_err(|e| AppError::Internal(e.into()))?
            }
            _ => String::new(),
        };

        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (email, password_hash, is_admin, public_uid) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, email, is_admin, public_uid",
        )
        .bind(attrs.email.clone().unwrap_or_default())
        .bind(password_hash)
        .bind(attrs.is_admin)
        .bind(public_uid)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn update(&self, id: i64, attrs: &UserAttrs) -> Result<User, AppError> {
        let mut qb = QueryBuilder::new("UPDATE users SET updated_at = now()");
        if let Some(email) = &attrs.email {
            qb.push(", email = ");
            qb.push_bind(email);
        }
        if let Some(is_admin) = attrs.is_admin {
            qb.push(", is_admin = ");
            qb.push_bind(is_admin);
        }
        if let Some(new_password) = attrs.password.as_deref() {
            if !new_password.is_empty() {
                let hash = password::hash_password(new_password)
                    .map_err(|e| AppError::Internal(e.into()))?;
                qb.push(", password_hash = ");
                qb.push_bind(hash);
            }
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING id, email, is_admin, public_uid");

        let row: UserRow = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_error)?;

        Ok(to_resource(row))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
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
