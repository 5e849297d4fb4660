//! Access token claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::admin::resource::AuthContext;
use crate::error::AppError;

/// Access token lifetime.
const TOKEN_LIFETIME_HOURS: i64 = 72;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id, as a string per JWT convention.
    pub sub: String,
    pub email: String,
    pub admin: bool,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i64, email: &str, admin: bool) -> Self {
        let exp = Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS);
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            admin,
            exp: exp.timestamp(),
        }
    }

    pub fn auth_context(&self) -> Result<AuthContext, AppError> {
        // We sign `sub` ourselves; a non-numeric value means a foreign or
        // tampered token.
        let user_id: i64 = self
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("invalid token subject"))?;
        Ok(AuthContext::new(user_id, self.admin))
    }
}

pub fn sign(claims: &Claims, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("sign access token: {e}")))
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::unauthorized(format!("invalid access token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_sign_and_verify_round_trip() {
        let claims = Claims::new(7, "dev@apps.test", false);
        let token = sign(&claims, SECRET).unwrap();

        let verified = verify(&token, SECRET).unwrap();
        assert_eq!(verified.sub, "7");
        assert_eq!(verified.email, "dev@apps.test");
        assert!(!verified.admin);

        let ctx = verified.auth_context().unwrap();
        assert_eq!(ctx.user_id(), 7);
        assert!(!ctx.is_admin());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = sign(&Claims::new(7, "dev@apps.test", false), SECRET).unwrap();
        assert!(matches!(
            verify(&token, "other-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            verify("not.a.token", SECRET),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_admin_flag_carries_through() {
        let token = sign(&Claims::new(1, "root@apps.test", true), SECRET).unwrap();
        let ctx = verify(&token, SECRET).unwrap().auth_context().unwrap();
        assert!(ctx.is_admin());
    }
}
