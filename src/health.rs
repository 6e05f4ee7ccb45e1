//! Liveness check

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{ApiPath, NpdClient};
use crate::error::Result;
use crate::tasks::epoch_seconds_to_utc;

/// Loosely typed status object returned by `/ping`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthStatus(pub Map<String, Value>);

impl HealthStatus {
    /// `false` only when the service explicitly reports `"ok": false`
    pub fn is_ok(&self) -> bool {
        self.0.get("ok").and_then(Value::as_bool).unwrap_or(true)
    }

    /// Server clock when the status was produced
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("time")
            .and_then(Value::as_f64)
            .and_then(epoch_seconds_to_utc)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl NpdClient {
    /// Call `/ping`; `Ok(None)` if the endpoint is not there
    pub async fn ping(&self) -> Result<Option<HealthStatus>> {
        self.read(&ApiPath::new(["ping"])).await
    }

    /// Connectivity check for status indicators; never fails
    pub async fn is_alive(&self) -> bool {
        match self.ping().await {
            Ok(Some(status)) => status.is_ok(),
            Ok(None) => false,
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_status_fields() {
        let status: HealthStatus =
            serde_json::from_value(json!({"ok": true, "time": 1700000000.5})).unwrap();
        assert!(status.is_ok());
        assert_eq!(status.server_time().unwrap().timestamp(), 1_700_000_000);

        let status: HealthStatus = serde_json::from_value(json!({"ok": false})).unwrap();
        assert!(!status.is_ok());
        assert!(status.server_time().is_none());

        assert!(HealthStatus::default().is_ok());
    }
}
