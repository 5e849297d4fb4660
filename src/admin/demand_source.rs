//! Demand source catalog: the set of integrated ad networks. Globally
//! visible; only admins manage the list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::admin::resource::{
    AuthContext, ResourceInstancePermissions, ResourcePermissions, ResourcePolicy, ResourceService,
};
use crate::admin::scopes::Scope;
use crate::error::AppError;
use crate::store::demand_sources::DemandSourceRepo;

pub const DEMAND_SOURCE_RESOURCE_KEY: &str = "demand_source";

#[derive(Debug, Clone, Serialize)]
pub struct DemandSource {
    pub id: i64,
    #[serde(flatten)]
    pub attrs: DemandSourceAttrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandSourceAttrs {
    pub human_name: Option<String>,
    /// Stable adapter identifier, e.g. `applovin`.
    pub api_key: Option<String>,
}

pub type DemandSourceService = ResourceService<DemandSourceRepo, DemandSourcePolicy>;

pub fn new_demand_source_service(repo: Arc<DemandSourceRepo>) -> DemandSourceService {
    ResourceService::new(DEMAND_SOURCE_RESOURCE_KEY, repo, DemandSourcePolicy)
}

pub struct DemandSourcePolicy;

#[async_trait]
impl ResourcePolicy for DemandSourcePolicy {
    type Resource = DemandSource;
    type Attrs = DemandSourceAttrs;

    fn permissions(&self, auth: &AuthContext) -> ResourcePermissions {
        ResourcePermissions {
            read: true,
            create: auth.is_admin(),
        }
    }

    fn instance_permissions(
        &self,
        auth: &AuthContext,
        _demand_source: &DemandSource,
    ) -> ResourceInstancePermissions {
        ResourceInstancePermissions {
            update: auth.is_admin(),
            delete: auth.is_admin(),
        }
    }

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Public
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Private
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        _attrs: &DemandSourceAttrs,
    ) -> Result<(), AppError> {
        if !auth.is_admin() {
            return Err(AppError::forbidden("only admins may create demand sources"));
        }
        Ok(())
    }
}
