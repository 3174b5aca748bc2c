//! Status derivation over realistic workload snapshots, driven through
//! the same typed objects the Kubernetes client returns.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use ldp_models::ServiceHealth;
use ldp_server::core::status::{
    Evaluation, PodSnapshot, WorkloadSnapshot, classify_newest_pod, evaluate,
};
use serde_json::{from_value, json};

fn deployment(generation: i64, status: serde_json::Value) -> Deployment {
    from_value(json!({
        "metadata": { "name": "api", "generation": generation },
        "spec": { "replicas": 2, "selector": { "matchLabels": { "app": "api" } } },
        "status": status,
    }))
    .unwrap()
}

#[test]
fn settled_deployment_is_available() {
    let deployment = deployment(
        3,
        json!({
            "observedGeneration": 3,
            "replicas": 2,
            "updatedReplicas": 2,
            "availableReplicas": 2,
        }),
    );
    let snapshot = WorkloadSnapshot::from(&deployment);
    assert_eq!(
        evaluate(&snapshot),
        Evaluation::Settled(ServiceHealth::Available)
    );
}

#[test]
fn rollout_in_flight_is_progressing() {
    let deployment = deployment(
        4,
        json!({
            "observedGeneration": 3,
            "replicas": 2,
            "updatedReplicas": 2,
            "availableReplicas": 2,
        }),
    );
    assert_eq!(
        evaluate(&WorkloadSnapshot::from(&deployment)),
        Evaluation::Settled(ServiceHealth::Progressing)
    );
}

#[test]
fn stale_replicas_defer_to_pod_inspection() {
    let set: StatefulSet = from_value(json!({
        "metadata": { "name": "pg", "generation": 2 },
        "spec": {
            "selector": { "matchLabels": { "app": "pg" } },
            "serviceName": "pg",
            "template": { "metadata": { "labels": { "app": "pg" } } },
        },
        "status": {
            "observedGeneration": 2,
            "replicas": 2,
            "updatedReplicas": 1,
            "availableReplicas": 1,
        },
    }))
    .unwrap();
    assert_eq!(
        evaluate(&WorkloadSnapshot::from(&set)),
        Evaluation::InspectNewestPod
    );
}

#[test]
fn crash_looping_pod_marks_workload_unhealthy() {
    let healthy: Pod = from_value(json!({
        "metadata": {
            "name": "pg-0",
            "creationTimestamp": "2024-01-01T00:00:00Z",
        },
        "status": {
            "containerStatuses": [
                { "name": "container-0", "ready": true, "restartCount": 0,
                  "image": "postgres:15", "imageID": "",
                  "state": { "running": { } } },
            ],
        },
    }))
    .unwrap();
    let crashing: Pod = from_value(json!({
        "metadata": {
            "name": "pg-1",
            "creationTimestamp": "2024-01-02T00:00:00Z",
        },
        "status": {
            "containerStatuses": [
                { "name": "container-0", "ready": false, "restartCount": 4,
                  "image": "postgres:15", "imageID": "",
                  "state": { "waiting": { "reason": "CrashLoopBackOff" } } },
            ],
        },
    }))
    .unwrap();

    let snapshots: Vec<PodSnapshot> =
        [&healthy, &crashing].into_iter().map(PodSnapshot::from).collect();
    assert_eq!(
        classify_newest_pod(&snapshots),
        Some(ServiceHealth::Unhealthy)
    );
}
