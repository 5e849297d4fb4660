//! Authentication service: the three credential channels (password login
//! issuing a bearer token, password login writing a server-side session,
//! API keys) plus the constant-time super-user fallback.

pub mod jwt;
pub mod middleware;
pub mod session;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::admin::resource::AuthContext;
use crate::config::SuperUserConfig;
use crate::error::AppError;
use crate::keys::api_key;
use crate::password;
use crate::store::api_keys::ApiKeyRepo;
use crate::store::users::{UserCredentials, UserRepo};

#[derive(Debug, Deserialize)]
pub struct LogInRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// User shape exposed by login responses.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LogInResponse {
    pub user: PublicUser,
    pub access_token: String,
}

pub struct AuthService {
    users: Arc<UserRepo>,
    api_keys: Arc<ApiKeyRepo>,
    sessions: session::SessionStore,
    jwt_secret: String,
    super_user: SuperUserConfig,
}

impl AuthService {
    pub fn new(
        users: Arc<UserRepo>,
        api_keys: Arc<ApiKeyRepo>,
        jwt_secret: String,
        super_user: SuperUserConfig,
    ) -> Self {
        Self {
            users,
            api_keys,
            sessions: session::SessionStore::new(),
            jwt_secret,
            super_user,
        }
    }

    /// Shared user lookup + password verify. Missing user and wrong
    /// password are indistinguishable to the caller.
    async fn authenticate_user(&self, req: &LogInRequest) -> Result<UserCredentials, AppError> {
        let user = self
            .users
            .find_by_email(&req.email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let matches = password::verify_password(&user.password_hash, &req.password)
            .map_err(|e| AppError::Internal(e.into()))?;
        if !matches {
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Password login issuing a signed bearer token.
    pub async fn log_in_with_access_token(
        &self,
        req: &LogInRequest,
    ) -> Result<LogInResponse, AppError> {
        let user = self.authenticate_user(req).await?;
        let is_admin = user.is_admin.unwrap_or(false);

        let claims = jwt::Claims::new(user.id, &user.email, is_admin);
        let access_token = jwt::sign(&claims, &self.jwt_secret)?;

        Ok(LogInResponse {
            user: PublicUser {
                id: user.id,
                email: user.email,
                is_admin,
            },
            access_token,
        })
    }

    /// Password login writing a server-side session; returns the cookie
    /// token.
    pub async fn log_in_with_session(&self, req: &LogInRequest) -> Result<String, AppError> {
        let user = self.authenticate_user(req).await?;
        self.sessions.create(user.id, user.is_admin.unwrap_or(false))
    }

    pub fn destroy_session(&self, token: &str) {
        self.sessions.destroy(token);
    }

    pub fn session_context(&self, token: &str) -> Option<AuthContext> {
        self.sessions.get(token)
    }

    /// Validate a bearer JWT.
    pub fn verify_access_token(&self, token: &str) -> Result<AuthContext, AppError> {
        jwt::verify(token, &self.jwt_secret)?.auth_context()
    }

    /// Resolve an API-key bearer token to its owner's context and record
    /// the access. Bookkeeping failures are logged, never surfaced: a valid
    /// key must not stop authenticating because a timestamp write failed.
    pub async fn resolve_api_key(&self, value: &str) -> Result<AuthContext, AppError> {
        let key_id = api_key::parse_api_key(value)?;

        let key = match self.api_keys.access(key_id).await {
            Ok(key) => key,
            Err(AppError::NotFound) => {
                return Err(AppError::unauthorized("unknown API key"));
            }
            Err(other) => return Err(other),
        };

        if let Err(e) = self.api_keys.touch(key_id).await {
            tracing::warn!("failed to record API key access for {}: {}", key_id, e);
        }

        Ok(AuthContext::new(
            key.user_id,
            key.user_is_admin.unwrap_or(false),
        ))
    }

    /// Basic-auth super-user check. Yields an admin context without a
    /// backing user row.
    pub fn super_user_context(&self, basic_payload: &str) -> Result<AuthContext, AppError> {
        let decoded = STANDARD
            .decode(basic_payload)
            .map_err(|_| AppError::unauthorized("malformed basic credentials"))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AppError::unauthorized("malformed basic credentials"))?;
        let (login, pass) = decoded
            .split_once(':')
            .ok_or_else(|| AppError::unauthorized("malformed basic credentials"))?;

        if password::is_super_user(login, pass, &self.super_user.login, &self.super_user.password) {
            Ok(AuthContext::system())
        } else {
            Err(AppError::unauthorized("invalid credentials"))
        }
    }
}
