//! Line item: a priced inventory row belonging to an app, backed by a
//! demand source account.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ad::{AdType, LineItemFormat};
use crate::admin::app::AppSummary;
use crate::admin::demand_source_account::DemandSourceAccountSummary;
use crate::admin::resource::{
    AttrsValidator, AuthContext, ResourcePolicy, ResourceService,
};
use crate::admin::scopes::{self, Scope};
use crate::admin::validation;
use crate::error::{AppError, ValidationErrors};
use crate::store::apps::AppRepo;
use crate::store::demand_source_accounts::DemandSourceAccountRepo;
use crate::store::line_items::LineItemRepo;

pub const LINE_ITEM_RESOURCE_KEY: &str = "line_item";

#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub id: i64,
    pub public_uid: String,
    #[serde(flatten)]
    pub attrs: LineItemAttrs,
    pub app: AppSummary,
    pub account: DemandSourceAccountSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItemAttrs {
    pub human_name: Option<String>,
    pub app_id: Option<i64>,
    pub bid_floor: Option<Decimal>,
    pub ad_type: Option<AdType>,
    pub format: Option<LineItemFormat>,
    pub account_id: Option<i64>,
    pub account_type: Option<String>,
    pub code: Option<String>,
    pub is_bidding: Option<bool>,
    pub extra: Option<Map<String, Value>>,
}

pub type LineItemService = ResourceService<LineItemRepo, LineItemPolicy>;

pub fn new_line_item_service(
    repo: Arc<LineItemRepo>,
    apps: Arc<AppRepo>,
    accounts: Arc<DemandSourceAccountRepo>,
) -> LineItemService {
    ResourceService::new(LINE_ITEM_RESOURCE_KEY, repo, LineItemPolicy { apps })
        .with_validator(LineItemValidator { accounts })
}

pub struct LineItemPolicy {
    apps: Arc<AppRepo>,
}

#[async_trait]
impl ResourcePolicy for LineItemPolicy {
    type Resource = LineItem;
    type Attrs = LineItemAttrs;

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        attrs: &LineItemAttrs,
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
        line_item: &LineItem,
        attrs: &LineItemAttrs,
    ) -> Result<(), AppError> {
        if let Some(app_id) = attrs.app_id {
            if Some(app_id) != line_item.attrs.app_id {
                scopes::find(self.apps.as_ref(), Scope::Owned, auth, app_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
            }
        }
        Ok(())
    }
}

struct LineItemValidator {
    accounts: Arc<DemandSourceAccountRepo>,
}

#[async_trait]
impl AttrsValidator<LineItemAttrs> for LineItemValidator {
    async fn validate(&self, attrs: &LineItemAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if let Some(bid_floor) = attrs.bid_floor {
            if bid_floor.is_sign_negative() {
                errors.add("bid_floor", "must be no less than 0");
            }
        }

        // The extra map is validated against the adapter of the backing
        // account's demand source.
        match attrs.account_id {
            Some(account_id) => match self.accounts.adapter_key(account_id).await? {
                Some(adapter) => validation::validate_adapter_map(
                    &mut errors,
                    "extra",
                    validation::line_item_extra_rules(&adapter),
                    attrs.extra.as_ref(),
                ),
                None => errors.add("account_id", "must reference an existing account"),
            },
            None if attrs.extra.is_some() => {
                errors.add("account_id", "cannot be blank");
            }
            None => {}
        }

        errors.into_result().map_err(AppError::from)
    }
}
