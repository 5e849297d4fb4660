//! Country catalog: readable by everyone, managed by admins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::admin::resource::{
    AttrsValidator, AuthContext, ResourceInstancePermissions, ResourcePermissions, ResourcePolicy,
    ResourceService,
};
use crate::admin::scopes::Scope;
use crate::admin::validation;
use crate::error::{AppError, ValidationErrors};
use crate::store::countries::CountryRepo;

pub const COUNTRY_RESOURCE_KEY: &str = "country";

#[derive(Debug, Clone, Serialize)]
pub struct Country {
    pub id: i64,
    #[serde(flatten)]
    pub attrs: CountryAttrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryAttrs {
    pub human_name: Option<String>,
    pub alpha2_code: Option<String>,
    pub alpha3_code: Option<String>,
}

pub type CountryService = ResourceService<CountryRepo, CountryPolicy>;

pub fn new_country_service(repo: Arc<CountryRepo>) -> CountryService {
    ResourceService::new(COUNTRY_RESOURCE_KEY, repo, CountryPolicy)
        .with_validator(CountryAttrsValidator)
}

pub struct CountryPolicy;

#[async_trait]
impl ResourcePolicy for CountryPolicy {
    type Resource = Country;
    type Attrs = CountryAttrs;

    fn permissions(&self, auth: &AuthContext) -> ResourcePermissions {
        ResourcePermissions {
            read: true,
            create: auth.is_admin(),
        }
    }

    fn instance_permissions(
        &self,
        auth: &AuthContext,
        _country: &Country,
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
        _attrs: &CountryAttrs,
    ) -> Result<(), AppError> {
        if !auth.is_admin() {
            return Err(AppError::forbidden("only admins may create countries"));
        }
        Ok(())
    }
}

struct CountryAttrsValidator;

#[async_trait]
impl AttrsValidator<CountryAttrs> for CountryAttrsValidator {
    async fn validate(&self, attrs: &CountryAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if let Some(alpha2) = &attrs.alpha2_code {
            validation::validate_length(&mut errors, "alpha2_code", alpha2, 2, 2);
        }
        if let Some(alpha3) = &attrs.alpha3_code {
            validation::validate_length(&mut errors, "alpha3_code", alpha3, 3, 3);
        }

        errors.into_result().map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alpha_code_lengths() {
        let validator = CountryAttrsValidator;

        let ok = CountryAttrs {
            human_name: Some("France".into()),
            alpha2_code: Some("FR".into()),
            alpha3_code: Some("FRA".into()),
        };
        assert!(validator.validate(&ok).await.is_ok());

        let bad = CountryAttrs {
            human_name: None,
            alpha2_code: Some("FRA".into()),
            alpha3_code: Some("FR".into()),
        };
        let err = validator.validate(&bad).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("alpha2_code: the length must be between 2 and 2"));
        assert!(text.contains("alpha3_code: the length must be between 3 and 3"));
    }
}
