//! App resource: a publisher application owned by exactly one user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ad::Platform;
use crate::admin::resource::{AuthContext, ResourcePolicy, ResourceService};
use crate::admin::scopes::{self, Scope};
use crate::admin::user::User;
use crate::error::AppError;
use crate::store::apps::AppRepo;
use crate::store::users::UserRepo;

pub const APP_RESOURCE_KEY: &str = "app";

#[derive(Debug, Clone, Serialize)]
pub struct App {
    pub id: i64,
    pub public_uid: String,
    #[serde(flatten)]
    pub attrs: AppAttrs,
    pub user: User,
}

/// App embedded into resources that hang off it (line items, profiles,
/// auction configurations). Carries the attributes but not the owner.
#[derive(Debug, Clone, Serialize)]
pub struct AppSummary {
    pub id: i64,
    #[serde(flatten)]
    pub attrs: AppAttrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppAttrs {
    #[serde(default)]
    pub platform_id: Option<Platform>,
    pub human_name: Option<String>,
    pub package_name: Option<String>,
    pub user_id: Option<i64>,
    /// Server-generated client credential; input values are ignored.
    pub app_key: Option<String>,
    pub settings: Option<Map<String, Value>>,
}

pub type AppService = ResourceService<AppRepo, AppPolicy>;

pub fn new_app_service(repo: Arc<AppRepo>, users: Arc<UserRepo>) -> AppService {
    ResourceService::new(APP_RESOURCE_KEY, repo, AppPolicy { users }).with_prepare_create_attrs(
        |auth, attrs| {
            // Non-admins always own what they create; admins may set any
            // owner but default to themselves.
            if !auth.is_admin() || attrs.user_id.is_none() {
                attrs.user_id = Some(auth.user_id());
            }
        },
    )
}

pub struct AppPolicy {
    users: Arc<UserRepo>,
}

impl AppPolicy {
    async fn check_can_manage_user(&self, auth: &AuthContext, user_id: i64) -> Result<(), AppError> {
        scopes::find(self.users.as_ref(), Scope::Private, auth, user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(())
    }
}

#[async_trait]
impl ResourcePolicy for AppPolicy {
    type Resource = App;
    type Attrs = AppAttrs;

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(&self, auth: &AuthContext, attrs: &AppAttrs) -> Result<(), AppError> {
        // A foreign owner requires the right to manage that user.
        if let Some(user_id) = attrs.user_id {
            if user_id != auth.user_id() {
                self.check_can_manage_user(auth, user_id).await?;
            }
        }
        Ok(())
    }

    async fn authorize_update(
        &self,
        auth: &AuthContext,
        app: &App,
        attrs: &AppAttrs,
    ) -> Result<(), AppError> {
        if let Some(user_id) = attrs.user_id {
            if Some(user_id) != app.attrs.user_id {
                self.check_can_manage_user(auth, user_id).await?;
            }
        }
        Ok(())
    }
}
