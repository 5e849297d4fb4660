//! Server-side session store for the browser login flow.
//!
//! Sessions are kept in process memory keyed by an opaque random token that
//! travels in a cookie; the client never sees user data. Expired entries
//! are dropped lazily on access.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::admin::resource::AuthContext;
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "bdnm_session";

const SESSION_LIFETIME_HOURS: i64 = 72;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct Session {
    user_id: i64,
    is_admin: bool,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    lifetime: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime: Duration::hours(SESSION_LIFETIME_HOURS),
        }
    }

    /// Open a session for a user, returning the opaque cookie token.
    pub fn create(&self, user_id: i64, is_admin: bool) -> Result<String, AppError> {
        let mut token_bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut token_bytes)
            .map_err(|e| AppError::internal(format!("generate session token: {e}")))?;
        let token = URL_SAFE_NO_PAD.encode(token_bytes);

        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                is_admin,
                expires_at: Utc::now() + self.lifetime,
            },
        );

        Ok(token)
    }

    pub fn get(&self, token: &str) -> Option<AuthContext> {
        let session = self.sessions.get(token)?;
        if session.expires_at <= Utc::now() {
            drop(session);
            self.sessions.remove(token);
            return None;
        }
        Some(AuthContext::new(session.user_id, session.is_admin))
    }

    pub fn destroy(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// `Set-Cookie` value that installs the session token.
    pub fn cookie(token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            SESSION_LIFETIME_HOURS * 3600
        )
    }

    /// `Set-Cookie` value that clears the session cookie.
    pub fn clear_cookie() -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }

    #[cfg(test)]
    fn insert_expired(&self, token: &str, user_id: i64) {
        self.sessions.insert(
            token.to_string(),
            Session {
                user_id,
                is_admin: false,
                expires_at: Utc::now() - Duration::seconds(1),
            },
        );
    }
}

/// Pull the session token out of a `Cookie` header value.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE && !value.is_empty() {
            Some(value)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_destroy() {
        let store = SessionStore::new();
        let token = store.create(7, false).unwrap();

        let ctx = store.get(&token).unwrap();
        assert_eq!(ctx.user_id(), 7);
        assert!(!ctx.is_admin());

        store.destroy(&token);
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn test_tokens_are_unique_and_opaque() {
        let store = SessionStore::new();
        let a = store.create(7, false).unwrap();
        let b = store.create(7, false).unwrap();
        assert_ne!(a, b);
        assert!(!a.contains('7'), "token must not embed user data: {}", a);
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let store = SessionStore::new();
        store.insert_expired("stale", 7);
        assert!(store.get("stale").is_none());
        // Lazy cleanup removed the entry entirely.
        assert!(store.sessions.get("stale").is_none());
    }

    #[test]
    fn test_cookie_parsing() {
        let header = format!("theme=dark; {}=abc123; other=1", SESSION_COOKIE);
        assert_eq!(token_from_cookie_header(&header), Some("abc123"));
        assert_eq!(token_from_cookie_header("theme=dark"), None);
        assert_eq!(
            token_from_cookie_header(&format!("{}=", SESSION_COOKIE)),
            None
        );
    }
}
