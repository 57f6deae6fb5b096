use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error),
        }
    }
}

/// Critical checks failing make the service unhealthy, others only degrade it.
pub fn overall_status(checks: &HashMap<String, ServiceHealth>, critical: &[&str]) -> HealthStatus {
    let mut status = HealthStatus::Healthy;

    for (name, health) in checks {
        if health.status == HealthStatus::Healthy {
            continue;
        }

        if critical.contains(&name.as_str()) {
            return HealthStatus::Unhealthy;
        }

        status = HealthStatus::Degraded;
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_critical_failures_are_unhealthy() {
        let mut checks = HashMap::new();
        checks.insert("database".to_string(), ServiceHealth::healthy(3));
        checks.insert("cache_service".to_string(), ServiceHealth::unhealthy("refused".to_string()));

        assert_eq!(overall_status(&checks, &["database"]), HealthStatus::Degraded);

        checks.insert("database".to_string(), ServiceHealth::unhealthy("timeout".to_string()));
        assert_eq!(overall_status(&checks, &["database"]), HealthStatus::Unhealthy);
    }
}
