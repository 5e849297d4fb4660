//! Demand source account: a user's credentials for one ad network.
//!
//! Accounts are readable when owned or shared (the platform keeps shared
//! house accounts) but managed only by their owner or an admin. The `extra`
//! credential map is validated against the adapter of the referenced
//! demand source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::admin::demand_source::DemandSource;
use crate::admin::resource::{
    AttrsValidator, AuthContext, ResourceInstancePermissions, ResourcePolicy, ResourceService,
};
use crate::admin::scopes::{self, Scope};
use crate::admin::user::User;
use crate::admin::validation;
use crate::error::{AppError, ValidationErrors};
use crate::store::demand_source_accounts::DemandSourceAccountRepo;
use crate::store::demand_sources::DemandSourceRepo;
use crate::store::users::UserRepo;

pub const DEMAND_SOURCE_ACCOUNT_RESOURCE_KEY: &str = "demand_source_account";

#[derive(Debug, Clone, Serialize)]
pub struct DemandSourceAccount {
    pub id: i64,
    pub public_uid: String,
    #[serde(flatten)]
    pub attrs: DemandSourceAccountAttrs,
    pub user: User,
    pub demand_source: DemandSource,
}

/// Account embedded into line items.
#[derive(Debug, Clone, Serialize)]
pub struct DemandSourceAccountSummary {
    pub id: i64,
    #[serde(flatten)]
    pub attrs: DemandSourceAccountAttrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandSourceAccountAttrs {
    pub user_id: Option<i64>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub demand_source_id: Option<i64>,
    pub is_bidding: Option<bool>,
    pub is_default: Option<bool>,
    pub extra: Option<Map<String, Value>>,
}

pub type DemandSourceAccountService =
    ResourceService<DemandSourceAccountRepo, DemandSourceAccountPolicy>;

pub fn new_demand_source_account_service(
    repo: Arc<DemandSourceAccountRepo>,
    users: Arc<UserRepo>,
    demand_sources: Arc<DemandSourceRepo>,
) -> DemandSourceAccountService {
    ResourceService::new(
        DEMAND_SOURCE_ACCOUNT_RESOURCE_KEY,
        repo,
        DemandSourceAccountPolicy {
            users,
            demand_sources: demand_sources.clone(),
        },
    )
    .with_prepare_create_attrs(|auth, attrs| {
        if attrs.user_id.is_none() && !auth.is_admin() {
            attrs.user_id = Some(auth.user_id());
        }
    })
    .with_validator(DemandSourceAccountValidator { demand_sources })
}

pub struct DemandSourceAccountPolicy {
    users: Arc<UserRepo>,
    demand_sources: Arc<DemandSourceRepo>,
}

#[async_trait]
impl ResourcePolicy for DemandSourceAccountPolicy {
    type Resource = DemandSourceAccount;
    type Attrs = DemandSourceAccountAttrs;

    fn instance_permissions(
        &self,
        auth: &AuthContext,
        account: &DemandSourceAccount,
    ) -> ResourceInstancePermissions {
        let own = auth.is_admin() || Some(auth.user_id()) == account.attrs.user_id;
        ResourceInstancePermissions {
            update: own,
            delete: own,
        }
    }

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::OwnedOrShared
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        attrs: &DemandSourceAccountAttrs,
    ) -> Result<(), AppError> {
        if let Some(user_id) = attrs.user_id {
            if user_id != auth.user_id() {
                scopes::find(self.users.as_ref(), Scope::Private, auth, user_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
            }
        }

        if let Some(demand_source_id) = attrs.demand_source_id {
            scopes::find(
                self.demand_sources.as_ref(),
                Scope::Public,
                auth,
                demand_source_id,
            )
            .await?;
        }

        Ok(())
    }

    async fn authorize_update(
        &self,
        auth: &AuthContext,
        account: &DemandSourceAccount,
        attrs: &DemandSourceAccountAttrs,
    ) -> Result<(), AppError> {
        if let Some(user_id) = attrs.user_id {
            if Some(user_id) != account.attrs.user_id {
                scopes::find(self.users.as_ref(), Scope::Private, auth, user_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
            }
        }

        if let Some(demand_source_id) = attrs.demand_source_id {
            if Some(demand_source_id) != account.attrs.demand_source_id {
                scopes::find(
                    self.demand_sources.as_ref(),
                    Scope::Public,
                    auth,
                    demand_source_id,
                )
                .await?;
            }
        }

        Ok(())
    }
}

struct DemandSourceAccountValidator {
    demand_sources: Arc<DemandSourceRepo>,
}

#[async_trait]
impl AttrsValidator<DemandSourceAccountAttrs> for DemandSourceAccountValidator {
    async fn validate(&self, attrs: &DemandSourceAccountAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        match attrs.demand_source_id {
            Some(demand_source_id) => {
                match self.demand_sources.adapter_key(demand_source_id).await? {
                    Some(adapter) => validation::validate_adapter_map(
                        &mut errors,
                        "extra",
                        validation::account_extra_rules(&adapter),
                        attrs.extra.as_ref(),
                    ),
                    None => errors.add(
                        "demand_source_id",
                        "must reference an existing demand source",
                    ),
                }
            }
            // Shape rules are keyed by the demand source, so a credential
            // change must name it.
            None if attrs.extra.is_some() => {
                errors.add("demand_source_id", "cannot be blank");
            }
            None => {}
        }

        errors.into_result().map_err(AppError::from)
    }
}
