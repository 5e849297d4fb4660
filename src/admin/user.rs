//! User resource.
//!
//! Users are admin-only as a collection; `/users/me` is the only way a
//! regular user sees their own record.

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
use crate::store::users::UserRepo;

pub const USER_RESOURCE_KEY: &str = "user";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub public_uid: String,
    pub email: String,
    pub is_admin: Option<bool>,
}

/// Creation/update payload. `password` is hashed by the repository and is
/// never serialized back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAttrs {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub password: Option<String>,
}

pub type UserService = ResourceService<UserRepo, UserPolicy>;

pub fn new_user_service(repo: Arc<UserRepo>) -> UserService {
    ResourceService::new(USER_RESOURCE_KEY, repo, UserPolicy).with_validator(UserAttrsValidator)
}

pub struct UserPolicy;

#[async_trait]
impl ResourcePolicy for UserPolicy {
    type Resource = User;
    type Attrs = UserAttrs;

    fn permissions(&self, auth: &AuthContext) -> ResourcePermissions {
        ResourcePermissions {
            read: auth.is_admin(),
            create: auth.is_admin(),
        }
    }

    fn instance_permissions(
        &self,
        auth: &AuthContext,
        _user: &User,
    ) -> ResourceInstancePermissions {
        ResourceInstancePermissions {
            update: auth.is_admin(),
            delete: auth.is_admin(),
        }
    }

    fn read_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Private
    }

    fn manage_scope(&self, _auth: &AuthContext) -> Scope {
        Scope::Private
    }

    async fn authorize_create(
        &self,
        auth: &AuthContext,
        _attrs: &UserAttrs,
    ) -> Result<(), AppError> {
        if !auth.is_admin() {
            return Err(AppError::forbidden("only admins may create users"));
        }
        Ok(())
    }
}

struct UserAttrsValidator;

#[async_trait]
impl AttrsValidator<UserAttrs> for UserAttrsValidator {
    async fn validate(&self, attrs: &UserAttrs) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();

        if let Some(email) = &attrs.email {
            validation::validate_email(&mut errors, "email", email);
        }
        if let Some(password) = &attrs.password {
            validation::validate_length(&mut errors, "password", password, 6, 50);
        }

        errors.into_result().map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validator_checks_email_and_password_length() {
        let validator = UserAttrsValidator;

        let ok = UserAttrs {
            email: Some("dev@apps.test".into()),
            password: Some("secret1".into()),
            is_admin: None,
        };
        assert!(validator.validate(&ok).await.is_ok());

        let bad = UserAttrs {
            email: Some("nope".into()),
            password: Some("short".into()),
            is_admin: None,
        };
        let err = validator.validate(&bad).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("email: must be a valid email address"));
        assert!(text.contains("password: the length must be between 6 and 50"));
    }

    #[test]
    fn test_permissions_are_admin_only() {
        let policy = UserPolicy;

        let admin = AuthContext::new(1, true);
        let user = AuthContext::new(7, false);

        assert!(policy.permissions(&admin).read);
        assert!(!policy.permissions(&user).read);
        assert!(!policy.permissions(&user).create);
    }
}
