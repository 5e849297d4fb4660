//! Account settings flows. Currently just the password change.

use serde::Deserialize;
use std::sync::Arc;

use crate::admin::resource::AuthContext;
use crate::admin::validation;
use crate::error::AppError;
use crate::store::users::UserRepo;

#[derive(Debug, Deserialize)]
pub struct PasswordUpdateRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub new_password_confirmation: String,
}

pub struct SettingsService {
    users: Arc<UserRepo>,
}

impl SettingsService {
    pub fn new(users: Arc<UserRepo>) -> Self {
        Self { users }
    }

    /// Change the caller's password.
    ///
    /// Rule violations surface as 400 with a field-prefixed message; a
    /// wrong `current_password` is 403.
    pub async fn update_password(
        &self,
        auth: &AuthContext,
        req: &PasswordUpdateRequest,
    ) -> Result<(), AppError> {
        if let Err(errors) = validation::validate_password_change(
            &req.current_password,
            &req.new_password,
            &req.new_password_confirmation,
        ) {
            return Err(AppError::bad_request(errors.to_string()));
        }

        if !auth.is_authenticated() || auth.user_id() == 0 {
            return Err(AppError::unauthorized("authentication required"));
        }

        self.users
            .update_password(auth.user_id(), &req.current_password, &req.new_password)
            .await
    }
}
