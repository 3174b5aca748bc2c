use serde::{Deserialize, Serialize};

/// Coarse workload health derived from Deployment/StatefulSet status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Progressing,
    Available,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceStatus {
    pub id: i32,
    pub status: ServiceHealth,
}
