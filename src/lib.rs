//! Administrative backend for a mobile-advertising mediation platform.
//!
//! The crate exposes a RESTful management API over a relational catalog of
//! apps, demand sources, accounts, line items, segments and auction
//! configurations.
//!
//! # Modules
//!
//! - [`admin`] - Generic resource pipeline (policy → scope → validator →
//!   repository → mapper) and per-entity resource services
//! - [`auth`] - Password, session, API-key and super-user authentication
//! - [`store`] - sqlx repositories over the PostgreSQL catalog
//! - [`keys`] - Snowflake public UIDs, API-key tokens, auction keys
//! - [`password`] - argon2id hashing with constant-time verification
//! - [`gateway`] - Axum router, handlers, middleware
//! - [`ad`] / [`adapters`] - Shared domain vocabulary

pub mod ad;
pub mod adapters;
pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod logging;
pub mod password;
pub mod store;

pub use admin::AdminService;
pub use admin::resource::{AuthContext, Collection, ResourceObject};
pub use config::AppConfig;
pub use db::Database;
pub use error::{AppError, ValidationErrors};
pub use store::Store;
