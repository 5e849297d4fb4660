//! API key resource.
//!
//! Keys do not go through the generic pipeline: they are identified by
//! UUIDv7, are always scoped to the caller (admins included), and cannot be
//! updated, only created and revoked. Listings omit the token value; it is
//! returned in full on create and find only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::admin::resource::{
    AuthContext, Collection, ResourceInstancePermissions, ResourceMeta, ResourceObject,
    ResourcePermissions,
};
use crate::error::AppError;
use crate::store::api_keys::ApiKeyRepo;

pub const API_KEY_RESOURCE_KEY: &str = "api_key";

const API_KEY_INSTANCE_PERMISSIONS: ResourceInstancePermissions = ResourceInstancePermissions {
    update: false,
    delete: true,
};

/// Listing shape: the token value is withheld.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyShort {
    pub id: String,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyFull {
    pub id: String,
    pub value: String,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

pub struct ApiKeyService {
    repo: Arc<ApiKeyRepo>,
}

impl ApiKeyService {
    pub fn new(repo: Arc<ApiKeyRepo>) -> Self {
        Self { repo }
    }

    pub fn meta(&self, _auth: &AuthContext) -> ResourceMeta {
        ResourceMeta {
            key: API_KEY_RESOURCE_KEY,
            permissions: ResourcePermissions {
                read: true,
                create: true,
            },
        }
    }

    fn require_user(auth: &AuthContext) -> Result<i64, AppError> {
        if !auth.is_authenticated() || auth.user_id() == 0 {
            return Err(AppError::unauthorized("API keys belong to a user account"));
        }
        Ok(auth.user_id())
    }

    pub async fn list(
        &self,
        auth: &AuthContext,
    ) -> Result<Collection<ResourceObject<ApiKeyShort>>, AppError> {
        let user_id = Self::require_user(auth)?;
        let keys = self.repo.list_owned_by_user(user_id).await?;
        Ok(keys.map(|key| ResourceObject {
            resource: key,
            permissions: API_KEY_INSTANCE_PERMISSIONS,
        }))
    }

    pub async fn find(
        &self,
        auth: &AuthContext,
        id: Uuid,
    ) -> Result<ResourceObject<ApiKeyFull>, AppError> {
        let user_id = Self::require_user(auth)?;
        let key = self.repo.find_owned_by_user(user_id, id).await?;
        Ok(ResourceObject {
            resource: key,
            permissions: API_KEY_INSTANCE_PERMISSIONS,
        })
    }

    pub async fn create(
        &self,
        auth: &AuthContext,
    ) -> Result<ResourceObject<ApiKeyFull>, AppError> {
        let user_id = Self::require_user(auth)?;
        let key = self.repo.create(user_id).await?;
        Ok(ResourceObject {
            resource: key,
            permissions: API_KEY_INSTANCE_PERMISSIONS,
        })
    }

    pub async fn delete(&self, auth: &AuthContext, id: Uuid) -> Result<(), AppError> {
        let user_id = Self::require_user(auth)?;
        // Resolving through the owner first keeps foreign keys invisible.
        self.repo.find_owned_by_user(user_id, id).await?;
        self.repo.delete(id).await
    }
}
