//! App demand profile: links an app to a demand source account and carries
//! the adapter-specific `data` map used at SDK initialization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::admin::app::AppSummary;
use crate::admin::demand_source::DemandSource;
use crate::admin::demand_source_account::DemandSourceAccountSummary;
use crate::admin::resource::{
    AttrsValidator, AuthContext, ResourcePolicy, ResourceService,
};
use crate::admin::scopes::{self, Scope};
use crate::admin::validation;
use crate::error::{AppError, ValidationErrors};
use crate::store::app_demand_profiles::AppDemandProfileRepo;
use crate::store::apps::AppRepo;
use crate::store::demand_sources::DemandSourceRepo;

pub const APP_DEMAND_PROFILE_RESOURCE_KEY: &str = "app_demand_profile";

#[derive(Debug, Clone, Serialize)]
pub struct AppDemandProfile {
    pub id: i64,
    pub public_uid: String,
    #[serde(flatten)]
    pub attrs: AppDemandProfileAttrs,
    pub app: AppSummary,
    pub account: DemandSourceAccountSummary,
    pub demand_source: DemandSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDemandProfileAttrs {
    pub app_id: Option<i64>,
    pub demand_source_id: Option<i64>,
    pub account_id: Option<i64>,
    pub data: Option<Map<String, Value>>,
    pub account_type: Option<String>,
}

pub type AppDemandProfileService = ResourceService<AppDemandProfileRepo, AppDemandProfilePolicy>;

pub fn new_app_demand_profile_service(
    repo: Arc<AppDemandProfileRepo>,
    apps: Arc<AppRepo>,
    demand_sources: Arc<DemandSourceRepo>,
) -> AppDemandProfileService {
    ResourceService::new(
        APP_DEMAND_PROFILE_RESOURCE_KEY,
        repo,
        AppDemandProfilePolicy { apps },
    )
    .with_validator(AppDemandProfileValidator { demand_sources })
}

pub struct AppDemandProfilePolicy {
    apps: Arc<AppRepo>,
}

#[async_trait]
impl ResourcePolicy for AppDemandProfilePolicy {
    type Resource = AppDemandProfile;
    type Attrs = AppDemandProfileAttrs;

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        attrs: &AppDemandProfileAttrs,
    ) -> Result<(), AppError> {
        let app_id = attrs.app_id.ok_or(AppError::NotFound)?;
        scopes::find(self.apps.as_ref(), Scope::Owned, auth, app_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(())
    }

    async fn authorize_update(
        &self,
        auth: &AuthContext,
        profile: &AppDemandProfile,
        attrs: &AppDemandProfileAttrs,
    ) -> Result<(), AppError> {
        if let Some(app_id) = attrs.app_id {
            if Some(app_id) != profile.attrs.app_id {
                scopes::find(self.apps.as_ref(), Scope::Owned, auth, app_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
            }
        }
        Ok(())
    }
}

struct AppDemandProfileValidator {
    demand_sources: Arc<DemandSourceRepo>,
}

#[async_trait]
impl AttrsValidator<AppDemandProfileAttrs> for AppDemandProfileValidator {
    async fn validate(&self, attrs: &AppDemandProfileAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        match attrs.demand_source_id {
            Some(demand_source_id) => {
                match self.demand_sources.adapter_key(demand_source_id).await? {
                    Some(adapter) => validation::validate_adapter_map(
                        &mut errors,
                        "data",
                        validation::profile_data_rules(&adapter),
                        attrs.data.as_ref(),
                    ),
                    None => errors.add(
                        "demand_source_id",
                        "must reference an existing demand source",
                    ),
                }
            }
            None if attrs.data.is_some() => {
                errors.add("demand_source_id", "cannot be blank");
            }
            None => {}
        }

        errors.into_result().map_err(AppError::from)
    }
}
