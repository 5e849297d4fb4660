//! Auction configuration: demands, price floor, timeout and optional
//! segment for one app/ad-type slice.
//!
//! Legacy (v1) and v2 configurations live in the same table; v2 rows carry
//! a `"v2": true` marker inside the `settings` JSON map. The marker
//! participates in the `(app_id, ad_type, segment_id, v2)` uniqueness
//! invariant, which the repository enforces inside the write transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ad::AdType;
use crate::admin::app::AppSummary;
use crate::admin::resource::{AuthContext, ResourcePolicy, ResourceService};
use crate::admin::scopes::{self, Scope};
use crate::admin::segment::SegmentSummary;
use crate::error::AppError;
use crate::store::apps::AppRepo;
use crate::store::auction_configurations::AuctionConfigurationRepo;
use crate::store::segments::SegmentRepo;

pub const AUCTION_CONFIGURATION_RESOURCE_KEY: &str = "auction_configuration";
pub const AUCTION_CONFIGURATION_V2_RESOURCE_KEY: &str = "auction_configuration_v2";

#[derive(Debug, Clone, Serialize)]
pub struct AuctionConfiguration {
    pub id: i64,
    pub public_uid: String,
    /// Base-32 rendering of the public UID; set at creation, immutable.
    pub auction_key: Option<String>,
    #[serde(flatten)]
    pub attrs: AuctionConfigurationAttrs,
    pub app: AppSummary,
    pub segment: Option<SegmentSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionConfigurationAttrs {
    pub name: Option<String>,
    pub app_id: Option<i64>,
    pub ad_type: Option<AdType>,
    pub pricefloor: Option<f64>,
    pub segment_id: Option<i64>,
    pub external_win_notifications: Option<bool>,
    pub demands: Option<Vec<String>>,
    pub bidding: Option<Vec<String>>,
    pub ad_unit_ids: Option<Vec<i64>>,
    pub timeout: Option<i32>,
    pub settings: Option<Map<String, Value>>,
    pub is_default: Option<bool>,
}

pub type AuctionConfigurationService =
    ResourceService<AuctionConfigurationRepo, AuctionConfigurationPolicy>;

pub fn new_auction_configuration_service(
    key: &'static str,
    repo: Arc<AuctionConfigurationRepo>,
    apps: Arc<AppRepo>,
    segments: Arc<SegmentRepo>,
) -> AuctionConfigurationService {
    ResourceService::new(key, repo, AuctionConfigurationPolicy { apps, segments })
}

pub struct AuctionConfigurationPolicy {
    apps: Arc<AppRepo>,
    segments: Arc<SegmentRepo>,
}

impl AuctionConfigurationPolicy {
    async fn check_can_manage_app(&self, auth: &AuthContext, app_id: i64) -> Result<(), AppError> {
        scopes::find(self.apps.as_ref(), Scope::Owned, auth, app_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(())
    }

    async fn check_can_read_segment(
        &self,
        auth: &AuthContext,
        segment_id: i64,
    ) -> Result<(), AppError> {
        scopes::find(self.segments.as_ref(), Scope::Owned, auth, segment_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(())
    }
}

#[async_trait]
impl ResourcePolicy for AuctionConfigurationPolicy {
    type Resource = AuctionConfiguration;
    type Attrs = AuctionConfigurationAttrs;

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        attrs: &AuctionConfigurationAttrs,
    ) -> Result<(), AppError> {
        let app_id = attrs.app_id.ok_or(AppError::NotFound)?;
        self.check_can_manage_app(auth, app_id).await?;

        if let Some(segment_id) = attrs.segment_id {
            self.check_can_read_segment(auth, segment_id).await?;
        }

        Ok(())
    }

    async fn authorize_update(
        &self,
        auth: &AuthContext,
        config: &AuctionConfiguration,
        attrs: &AuctionConfigurationAttrs,
    ) -> Result<(), AppError> {
        if let Some(app_id) = attrs.app_id {
            if Some(app_id) != config.attrs.app_id {
                self.check_can_manage_app(auth, app_id).await?;
            }
        }

        if let Some(segment_id) = attrs.segment_id {
            if Some(segment_id) != config.attrs.segment_id {
                self.check_can_read_segment(auth, segment_id).await?;
            }
        }

        Ok(())
    }
}
