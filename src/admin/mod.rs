//! Resource domain layer: the generic resource pipeline plus one module per
//! catalog entity (resource shape, policy, validator, service wiring).

pub mod api_key;
pub mod app;
pub mod app_demand_profile;
pub mod auction_configuration;
pub mod country;
pub mod demand_source;
pub mod demand_source_account;
pub mod line_item;
pub mod pagination;
pub mod resource;
pub mod scopes;
pub mod segment;
pub mod settings;
pub mod user;
pub mod validation;

use std::sync::Arc;

use crate::admin::api_key::ApiKeyService;
use crate::admin::app::AppService;
use crate::admin::app_demand_profile::AppDemandProfileService;
use crate::admin::auction_configuration::{
    AUCTION_CONFIGURATION_RESOURCE_KEY, AUCTION_CONFIGURATION_V2_RESOURCE_KEY,
    AuctionConfigurationService,
};
use crate::admin::country::CountryService;
use crate::admin::demand_source::DemandSourceService;
use crate::admin::demand_source_account::DemandSourceAccountService;
use crate::admin::line_item::LineItemService;
use crate::admin::resource::{AuthContext, ResourceMeta};
use crate::admin::segment::SegmentService;
use crate::admin::settings::SettingsService;
use crate::admin::user::UserService;
use crate::store::Store;

/// All resource services, wired once at startup.
pub struct AdminService {
    pub apps: Arc<AppService>,
    pub app_demand_profiles: Arc<AppDemandProfileService>,
    pub auction_configurations: Arc<AuctionConfigurationService>,
    pub auction_configurations_v2: Arc<AuctionConfigurationService>,
    pub countries: Arc<CountryService>,
    pub demand_sources: Arc<DemandSourceService>,
    pub demand_source_accounts: Arc<DemandSourceAccountService>,
    pub line_items: Arc<LineItemService>,
    pub segments: Arc<SegmentService>,
    pub users: Arc<UserService>,
    pub api_keys: Arc<ApiKeyService>,
    pub settings: Arc<SettingsService>,
}

impl AdminService {
    pub fn new(store: &Store) -> Self {
        Self {
            apps: Arc::new(app::new_app_service(
                store.apps.clone(),
                store.users.clone(),
            )),
            app_demand_profiles: Arc::new(app_demand_profile::new_app_demand_profile_service(
                store.app_demand_profiles.clone(),
                store.apps.clone(),
                store.demand_sources.clone(),
            )),
            auction_configurations: Arc::new(
                auction_configuration::new_auction_configuration_service(
                    AUCTION_CONFIGURATION_RESOURCE_KEY,
                    store.auction_configurations.clone(),
                    store.apps.clone(),
                    store.segments.clone(),
                ),
            ),
            auction_configurations_v2: Arc::new(
                auction_configuration::new_auction_configuration_service(
                    AUCTION_CONFIGURATION_V2_RESOURCE_KEY,
                    store.auction_configurations_v2.clone(),
                    store.apps.clone(),
                    store.segments.clone(),
                ),
            ),
            countries: Arc::new(country::new_country_service(store.countries.clone())),
            demand_sources: Arc::new(demand_source::new_demand_source_service(
                store.demand_sources.clone(),
            )),
            demand_source_accounts: Arc::new(
                demand_source_account::new_demand_source_account_service(
                    store.demand_source_accounts.clone(),
                    store.users.clone(),
                    store.demand_sources.clone(),
                ),
            ),
            line_items: Arc::new(line_item::new_line_item_service(
                store.line_items.clone(),
                store.apps.clone(),
                store.demand_source_accounts.clone(),
            )),
            segments: Arc::new(segment::new_segment_service(
                store.segments.clone(),
                store.apps.clone(),
            )),
            users: Arc::new(user::new_user_service(store.users.clone())),
            api_keys: Arc::new(ApiKeyService::new(store.api_keys.clone())),
            settings: Arc::new(SettingsService::new(store.users.clone())),
        }
    }

    /// Permissions map for `/resources`. Entries the caller cannot read are
    /// omitted so UIs only render navigable resources.
    pub fn resource_metas(&self, auth: &AuthContext) -> Vec<ResourceMeta> {
        let metas = [
            self.apps.meta(auth),
            self.app_demand_profiles.meta(auth),
            self.auction_configurations.meta(auth),
            self.auction_configurations_v2.meta(auth),
            self.countries.meta(auth),
            self.demand_sources.meta(auth),
            self.demand_source_accounts.meta(auth),
            self.line_items.meta(auth),
            self.segments.meta(auth),
            self.users.meta(auth),
            self.api_keys.meta(auth),
        ];

        metas
            .into_iter()
            .filter(|meta| meta.permissions.read)
            .collect()
    }
}
