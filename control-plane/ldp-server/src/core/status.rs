//! Workload health derivation, shared by Deployments and StatefulSets.
//!
//! The replica-count decision is pure; pod inspection is a second pure
//! step the caller feeds only when the first one asks for it, so both
//! halves stay deterministic under test.

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use ldp_models::ServiceHealth;

const CRASH_LOOP_REASON: &str = "CrashLoopBackOff";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadSnapshot {
    pub generation: Option<i64>,
    pub observed_generation: Option<i64>,
    pub spec_replicas: Option<i32>,
    pub replicas: i32,
    pub updated_replicas: i32,
    pub available_replicas: i32,
}

#[derive(Debug, PartialEq)]
pub enum Evaluation {
    Settled(ServiceHealth),
    /// Old replicas are still terminating; the newest pod decides between
    /// Progressing and Unhealthy.
    InspectNewestPod,
}

pub fn evaluate(snapshot: &WorkloadSnapshot) -> Evaluation {
    if snapshot.generation.unwrap_or(0)
        > snapshot.observed_generation.unwrap_or(0)
    {
        return Evaluation::Settled(ServiceHealth::Progressing);
    }
    if let Some(expected) = snapshot.spec_replicas {
        if snapshot.updated_replicas < expected {
            return Evaluation::Settled(ServiceHealth::Progressing);
        }
    }
    if snapshot.replicas > snapshot.updated_replicas {
        return Evaluation::InspectNewestPod;
    }
    if snapshot.available_replicas < snapshot.updated_replicas {
        return Evaluation::Settled(ServiceHealth::Progressing);
    }
    Evaluation::Settled(ServiceHealth::Available)
}

#[derive(Debug, Clone, Default)]
pub struct PodSnapshot {
    pub created: Option<DateTime<Utc>>,
    pub has_container_statuses: bool,
    pub first_waiting_reason: Option<String>,
}

/// Classify by the newest pod; `None` when the pod list is empty.
pub fn classify_newest_pod(pods: &[PodSnapshot]) -> Option<ServiceHealth> {
    let newest = pods.iter().max_by_key(|p| p.created)?;
    if !newest.has_container_statuses {
        return Some(ServiceHealth::Progressing);
    }
    if newest.first_waiting_reason.as_deref() == Some(CRASH_LOOP_REASON) {
        return Some(ServiceHealth::Unhealthy);
    }
    Some(ServiceHealth::Progressing)
}

impl From<&Deployment> for WorkloadSnapshot {
    fn from(deployment: &Deployment) -> Self {
        let status = deployment.status.as_ref();
        WorkloadSnapshot {
            generation: deployment.metadata.generation,
            observed_generation: status.and_then(|s| s.observed_generation),
            spec_replicas: deployment.spec.as_ref().and_then(|s| s.replicas),
            replicas: status.and_then(|s| s.replicas).unwrap_or(0),
            updated_replicas: status
                .and_then(|s| s.updated_replicas)
                .unwrap_or(0),
            available_replicas: status
                .and_then(|s| s.available_replicas)
                .unwrap_or(0),
        }
    }
}

impl From<&StatefulSet> for WorkloadSnapshot {
    fn from(set: &StatefulSet) -> Self {
        let status = set.status.as_ref();
        WorkloadSnapshot {
            generation: set.metadata.generation,
            observed_generation: status.and_then(|s| s.observed_generation),
            spec_replicas: set.spec.as_ref().and_then(|s| s.replicas),
            replicas: status.map(|s| s.replicas).unwrap_or(0),
            updated_replicas: status
                .and_then(|s| s.updated_replicas)
                .unwrap_or(0),
            available_replicas: status
                .and_then(|s| s.available_replicas)
                .unwrap_or(0),
        }
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref());
        PodSnapshot {
            created: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
            has_container_statuses: statuses.is_some_and(|s| !s.is_empty()),
            first_waiting_reason: statuses
                .and_then(|s| s.first())
                .and_then(|c| c.state.as_ref())
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.reason.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> WorkloadSnapshot {
        WorkloadSnapshot {
            generation: Some(3),
            observed_generation: Some(3),
            spec_replicas: Some(2),
            replicas: 2,
            updated_replicas: 2,
            available_replicas: 2,
        }
    }

    #[test]
    fn settled_available_when_counts_match() {
        assert_eq!(
            evaluate(&snapshot()),
            Evaluation::Settled(ServiceHealth::Available)
        );
    }

    #[test]
    fn unobserved_generation_is_progressing() {
        let s = WorkloadSnapshot {
            generation: Some(4),
            ..snapshot()
        };
        assert_eq!(
            evaluate(&s),
            Evaluation::Settled(ServiceHealth::Progressing)
        );
    }

    #[test]
    fn missing_updated_replicas_is_progressing() {
        let s = WorkloadSnapshot {
            updated_replicas: 1,
            ..snapshot()
        };
        assert_eq!(
            evaluate(&s),
            Evaluation::Settled(ServiceHealth::Progressing)
        );
    }

    #[test]
    fn stale_replicas_require_pod_inspection() {
        let s = WorkloadSnapshot {
            replicas: 3,
            spec_replicas: None,
            ..snapshot()
        };
        assert_eq!(evaluate(&s), Evaluation::InspectNewestPod);
    }

    #[test]
    fn unavailable_replicas_are_progressing() {
        let s = WorkloadSnapshot {
            available_replicas: 1,
            ..snapshot()
        };
        assert_eq!(
            evaluate(&s),
            Evaluation::Settled(ServiceHealth::Progressing)
        );
    }

    fn pod(ts: i64, statuses: bool, waiting: Option<&str>) -> PodSnapshot {
        PodSnapshot {
            created: Some(Utc.timestamp_opt(ts, 0).unwrap()),
            has_container_statuses: statuses,
            first_waiting_reason: waiting.map(String::from),
        }
    }

    #[test]
    fn newest_pod_wins_classification() {
        let pods = vec![
            pod(100, true, None),
            pod(200, true, Some("CrashLoopBackOff")),
        ];
        assert_eq!(
            classify_newest_pod(&pods),
            Some(ServiceHealth::Unhealthy)
        );
    }

    #[test]
    fn newest_pod_without_statuses_is_progressing() {
        let pods = vec![pod(100, false, None)];
        assert_eq!(
            classify_newest_pod(&pods),
            Some(ServiceHealth::Progressing)
        );
    }

    #[test]
    fn empty_pod_list_is_unclassifiable() {
        assert_eq!(classify_newest_pod(&[]), None);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let s = snapshot();
        assert_eq!(evaluate(&s), evaluate(&s));
    }
}
