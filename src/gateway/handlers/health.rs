//! Health check handler
//!
//! Aggregates named pingers into one status body:
//!
//! ```json
//! {"status":"error","database":"ok","sessions":"error"}
//! ```
//!
//! Any failing pinger turns the whole response into a 500; entries with no
//! pinger configured are skipped.

use async_trait::async_trait;
use axum::Json;
use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::Database;

#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Named dependency pingers; `None` entries are skipped.
pub type HealthCheckParams = BTreeMap<&'static str, Option<Arc<dyn Pinger>>>;

pub struct DatabasePinger {
    db: Database,
}

impl DatabasePinger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Pinger for DatabasePinger {
    async fn ping(&self) -> anyhow::Result<()> {
        self.db.health_check().await?;
        Ok(())
    }
}

pub async fn run_health_checks(services: &HealthCheckParams) -> (StatusCode, Json<Value>) {
    let mut body = Map::new();
    let mut healthy = true;

    for (name, pinger) in services {
        let Some(pinger) = pinger else { continue };

        match pinger.ping().await {
            Ok(()) => {
                body.insert(name.to_string(), json!("ok"));
            }
            Err(e) => {
                tracing::error!("[HEALTH] {} ping failed: {}", name, e);
                body.insert(name.to_string(), json!("error"));
                healthy = false;
            }
        }
    }

    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "error")
    };
    body.insert("status".to_string(), json!(label));

    (status, Json(Value::Object(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPinger {
        should_fail: bool,
    }

    #[async_trait]
    impl Pinger for MockPinger {
        async fn ping(&self) -> anyhow::Result<()> {
            if self.should_fail {
                anyhow::bail!("ping failed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mixed_pingers_report_error() {
        let mut services = HealthCheckParams::new();
        services.insert("service1", Some(Arc::new(MockPinger { should_fail: false }) as _));
        services.insert("service2", Some(Arc::new(MockPinger { should_fail: true }) as _));
        services.insert("service3", None);

        let (status, Json(body)) = run_health_checks(&services).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"status": "error", "service1": "ok", "service2": "error"})
        );
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let mut services = HealthCheckParams::new();
        services.insert("service1", Some(Arc::new(MockPinger { should_fail: false }) as _));

        let (status, Json(body)) = run_health_checks(&services).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "service1": "ok"}));
    }
}
