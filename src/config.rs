use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL for the catalog
    #[serde(default)]
    pub database_url: String,
    /// HS256 secret for access tokens
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub super_user: SuperUserConfig,
    /// Snowflake node id for public UID allocation (0..=1023)
    #[serde(default)]
    pub snowflake_node: i64,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SuperUserConfig {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// TTL for demand source lookups used by attribute validators
    pub demand_sources_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            demand_sources_ttl_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        let mut config: AppConfig =
            serde_yaml::from_str(&content).expect("Failed to parse config yaml");
        config.apply_env_overrides();
        config
    }

    /// Secrets come from the environment in deployed setups; yaml values are
    /// development fallbacks.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET_KEY") {
            self.jwt_secret = secret;
        }
        if let Ok(login) = std::env::var("SUPERUSER_LOGIN") {
            self.super_user.login = login;
        }
        if let Ok(password) = std::env::var("SUPERUSER_PASSWORD") {
            self.super_user.password = password;
        }
    }
}
