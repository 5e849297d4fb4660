//! Segment: an ordered rule set classifying traffic for an app. Auction
//! configurations may branch on the matched segment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ad::SegmentFilter;
use crate::admin::app::AppSummary;
use crate::admin::resource::{
    AttrsValidator, AuthContext, ResourcePolicy, ResourceService,
};
use crate::admin::scopes::{self, Scope};
use crate::admin::validation;
use crate::error::{AppError, ValidationErrors};
use crate::store::apps::AppRepo;
use crate::store::segments::SegmentRepo;

pub const SEGMENT_RESOURCE_KEY: &str = "segment";

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    pub id: i64,
    pub public_uid: String,
    #[serde(flatten)]
    pub attrs: SegmentAttrs,
    pub app: AppSummary,
}

/// Segment embedded into auction configurations.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentSummary {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentAttrs {
    pub name: Option<String>,
    pub description: Option<String>,
    pub filters: Option<Vec<SegmentFilter>>,
    pub enabled: Option<bool>,
    pub app_id: Option<i64>,
    pub priority: Option<i32>,
}

pub type SegmentService = ResourceService<SegmentRepo, SegmentPolicy>;

pub fn new_segment_service(repo: Arc<SegmentRepo>, apps: Arc<AppRepo>) -> SegmentService {
    ResourceService::new(SEGMENT_RESOURCE_KEY, repo, SegmentPolicy { apps })
        .with_validator(SegmentAttrsValidator)
}

pub struct SegmentPolicy {
    apps: Arc<AppRepo>,
}

#[async_trait]
impl ResourcePolicy for SegmentPolicy {
    type Resource = Segment;
    type Attrs = SegmentAttrs;

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Owned
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        attrs: &SegmentAttrs,
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
        segment: &Segment,
        attrs: &SegmentAttrs,
    ) -> Result<(), AppError> {
        if let Some(app_id) = attrs.app_id {
            if Some(app_id) != segment.attrs.app_id {
                scopes::find(self.apps.as_ref(), Scope::Owned, auth, app_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
            }
        }
        Ok(())
    }
}

struct SegmentAttrsValidator;

#[async_trait]
impl AttrsValidator<SegmentAttrs> for SegmentAttrsValidator {
    async fn validate(&self, attrs: &SegmentAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if let Some(priority) = attrs.priority {
            if priority < 0 {
                errors.add("priority", "must be no less than 0");
            }
        }
        if let Some(filters) = &attrs.filters {
            validation::validate_segment_filters(&mut errors, filters);
        }

        errors.into_result().map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_priority_must_be_non_negative() {
        let validator = SegmentAttrsValidator;

        let ok = SegmentAttrs {
            priority: Some(0),
            ..Default::default()
        };
        assert!(validator.validate(&ok).await.is_ok());

        let bad = SegmentAttrs {
            priority: Some(-1),
            ..Default::default()
        };
        let err = validator.validate(&bad).await.unwrap_err();
        assert!(err.to_string().starts_with("priority: "));
    }

    #[tokio::test]
    async fn test_filter_operators_are_checked() {
        let validator = SegmentAttrsValidator;

        let bad = SegmentAttrs {
            filters: Some(vec![SegmentFilter {
                filter_type: "country".into(),
                name: String::new(),
                operator: "LIKE".into(),
                values: vec!["US".into()],
            }]),
            ..Default::default()
        };
        assert!(validator.validate(&bad).await.is_err());
    }
}
