//! Builders for every cluster object this controller projects. Pure
//! functions so the derived shapes stay unit-testable without a cluster.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar as K8sEnvVar,
    EnvVarSource as K8sEnvVarSource, LocalObjectReference, Namespace,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Secret, SecretKeySelector,
    Service as K8sService, ServicePort, ServiceSpec, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressServiceBackend, IngressSpec, IngressTLS,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;

use ldp_models::validation::sanitize_secret_name;
use ldp_models::{EnvVar, EnvVarSource, Service};

use super::{
    APP_LABEL, CONTAINER_NAME, MANAGED_LABEL, NAMESPACE_LABEL,
    REGCRED_SECRET_NAME, SECRET_KEY, SERVICE_TYPE_LABEL, SERVICE_TYPE_MANAGED,
    SERVICE_TYPE_SERVICE,
};

pub fn ingress_name(service_name: &str) -> String {
    format!("{service_name}-ingress")
}

pub fn certificate_name(project: &str) -> String {
    format!("{project}-tls")
}

fn managed_labels(service_type: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(SERVICE_TYPE_LABEL.to_string(), service_type.to_string());
    labels
}

fn app_selector(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), name.to_string());
    labels
}

pub fn namespace(project: &str) -> Namespace {
    let mut labels = BTreeMap::new();
    labels.insert(NAMESPACE_LABEL.to_string(), "true".to_string());
    Namespace {
        metadata: ObjectMeta {
            name: Some(project.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// cert-manager Certificate, applied as a dynamic object.
pub fn certificate_manifest(
    project: &str,
    domain: &str,
    cluster_issuer: &str,
) -> serde_json::Value {
    let name = certificate_name(project);
    json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "Certificate",
        "metadata": { "name": name, "namespace": project },
        "spec": {
            "secretName": name,
            "dnsNames": [format!("{project}.{domain}")],
            "issuerRef": { "kind": "ClusterIssuer", "name": cluster_issuer },
        },
    })
}

/// A DB-backed secret mirrored into the project namespace.
pub fn mirrored_secret(cluster_name: &str, value: &str) -> Secret {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    let mut string_data = BTreeMap::new();
    string_data.insert(SECRET_KEY.to_string(), value.to_string());
    Secret {
        metadata: ObjectMeta {
            name: Some(cluster_name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        string_data: Some(string_data),
        ..Default::default()
    }
}

/// Aggregated image-pull credentials. Carries no managed label: the row
/// set it derives from lives in `container_registry`, not `secret`, so it
/// must stay out of the reconciler's delete-unknown scope.
pub fn regcred_secret(dockerconfig_json: Vec<u8>) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        ByteString(dockerconfig_json),
    );
    Secret {
        metadata: ObjectMeta {
            name: Some(REGCRED_SECRET_NAME.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

fn container_env(env_vars: &[EnvVar]) -> Vec<K8sEnvVar> {
    env_vars
        .iter()
        .map(|ev| match &ev.source {
            EnvVarSource::Value { value } => K8sEnvVar {
                name: ev.name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            },
            EnvVarSource::Secret { secret } => K8sEnvVar {
                name: ev.name.clone(),
                value_from: Some(K8sEnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        key: SECRET_KEY.to_string(),
                        name: sanitize_secret_name(secret).into(),
                        optional: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        })
        .collect()
}

/// ClusterIP Service in front of a user workload: port 80 to the
/// container port.
pub fn app_service(service: &Service) -> K8sService {
    K8sService {
        metadata: ObjectMeta {
            name: Some(service.name.clone()),
            labels: Some(managed_labels(SERVICE_TYPE_SERVICE)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(app_selector(&service.name)),
            ports: Some(vec![ServicePort {
                port: 80,
                target_port: Some(IntOrString::Int(service.port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn app_deployment(service: &Service) -> Deployment {
    let selector = app_selector(&service.name);
    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), Quantity("250m".to_string()));
    limits.insert("memory".to_string(), Quantity("512Mi".to_string()));

    Deployment {
        metadata: ObjectMeta {
            name: Some(service.name.clone()),
            labels: Some(managed_labels(SERVICE_TYPE_SERVICE)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(service.replicas),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(service.image.clone()),
                        image_pull_policy: Some("Always".to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: service.port,
                            ..Default::default()
                        }]),
                        env: Some(container_env(&service.env_vars)),
                        resources: Some(ResourceRequirements {
                            limits: Some(limits),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    image_pull_secrets: Some(vec![LocalObjectReference {
                        name: REGCRED_SECRET_NAME.to_string().into(),
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Routes `<project>.<domain><prefix>` to the service; only built when a
/// public prefix is declared.
pub fn app_ingress(
    service: &Service,
    domain: &str,
    tls_enabled: bool,
) -> Ingress {
    let host = format!("{}.{}", service.project, domain);
    let prefix = service
        .public_api_prefix
        .clone()
        .unwrap_or_else(|| "/".to_string());

    let tls = tls_enabled.then(|| {
        vec![IngressTLS {
            hosts: Some(vec![host.clone()]),
            secret_name: Some(certificate_name(&service.project)),
        }]
    });

    Ingress {
        metadata: ObjectMeta {
            name: Some(ingress_name(&service.name)),
            labels: Some(managed_labels(SERVICE_TYPE_SERVICE)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(prefix),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service.name.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(80),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Stable-DNS Service in front of a managed data store.
pub fn managed_service(name: &str, pod_port: i32) -> K8sService {
    let mut labels = managed_labels(SERVICE_TYPE_MANAGED);
    labels.insert(APP_LABEL.to_string(), name.to_string());
    K8sService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(app_selector(name)),
            ports: Some(vec![ServicePort {
                port: pod_port,
                target_port: Some(IntOrString::Int(pod_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub struct ManagedVolume<'a> {
    pub mount_path: &'a str,
    pub size: &'a str,
}

/// Everything type-specific a managed StatefulSet needs, assembled by the
/// managed-services controller.
pub struct ManagedWorkload<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub ports: Vec<ContainerPort>,
    pub command: Option<Vec<String>>,
    pub env: Vec<K8sEnvVar>,
    pub liveness: Probe,
    pub readiness: Probe,
    pub volume: Option<ManagedVolume<'a>>,
}

pub fn managed_stateful_set(workload: ManagedWorkload<'_>) -> StatefulSet {
    let selector = app_selector(workload.name);

    let volume_mounts = workload.volume.as_ref().map(|v| {
        vec![VolumeMount {
            name: "data".to_string(),
            mount_path: v.mount_path.to_string(),
            ..Default::default()
        }]
    });

    let volume_claim_templates = workload.volume.as_ref().map(|v| {
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_string(), Quantity(v.size.to_string()));
        vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]
    });

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(workload.name.to_string()),
            labels: Some(managed_labels(SERVICE_TYPE_MANAGED)),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: workload.name.to_string().into(),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(workload.image.to_string()),
                        ports: Some(workload.ports),
                        command: workload.command,
                        env: Some(workload.env),
                        volume_mounts,
                        liveness_probe: Some(workload.liveness),
                        readiness_probe: Some(workload.readiness),
                        ..Default::default()
                    }],
                    termination_grace_period_seconds: Some(10),
                    ..Default::default()
                }),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ExecAction;

    fn sample_service() -> Service {
        Service {
            id: Some(1),
            project: "p".into(),
            name: "api".into(),
            image: "nginx:1".into(),
            port: 8080,
            public_api_prefix: Some("/api".into()),
            env_vars: vec![
                EnvVar {
                    name: "MODE".into(),
                    source: EnvVarSource::Value { value: "prod".into() },
                },
                EnvVar {
                    name: "PW".into(),
                    source: EnvVarSource::Secret { secret: "DB_PASS".into() },
                },
            ],
            replicas: 2,
        }
    }

    #[test]
    fn namespace_carries_project_label() {
        let ns = namespace("proj-a");
        assert_eq!(ns.metadata.name.as_deref(), Some("proj-a"));
        assert_eq!(
            ns.metadata.labels.unwrap().get(NAMESPACE_LABEL).unwrap(),
            "true"
        );
    }

    #[test]
    fn deployment_materialises_env_and_replicas() {
        let deployment = app_deployment(&sample_service());
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.name, CONTAINER_NAME);
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));

        let env = container.env.as_ref().unwrap();
        assert_eq!(env[0].value.as_deref(), Some("prod"));
        let secret_ref = env[1]
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(secret_ref.key, SECRET_KEY);
        // DB_PASS sanitises to db-pass for the cluster object name.
        assert_eq!(serde_json::to_value(&secret_ref.name).unwrap(), "db-pass");

        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits.get("cpu").unwrap().0, "250m");
        assert_eq!(limits.get("memory").unwrap().0, "512Mi");
    }

    #[test]
    fn service_fronts_port_80() {
        let svc = app_service(&sample_service());
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
    }

    #[test]
    fn ingress_routes_project_host_to_prefix() {
        let ingress = app_ingress(&sample_service(), "letsdeploy.space", true);
        assert_eq!(ingress.metadata.name.as_deref(), Some("api-ingress"));
        let spec = ingress.spec.unwrap();
        let rule = &spec.rules.as_ref().unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("p.letsdeploy.space"));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/api"));
        let tls = &spec.tls.unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("p-tls"));
    }

    #[test]
    fn certificate_targets_project_host() {
        let manifest =
            certificate_manifest("proj-a", "letsdeploy.space", "letsencrypt");
        assert_eq!(manifest["kind"], "Certificate");
        assert_eq!(manifest["metadata"]["name"], "proj-a-tls");
        assert_eq!(manifest["spec"]["secretName"], "proj-a-tls");
        assert_eq!(
            manifest["spec"]["dnsNames"][0],
            "proj-a.letsdeploy.space"
        );
        assert_eq!(manifest["spec"]["issuerRef"]["name"], "letsencrypt");
    }

    #[test]
    fn mirrored_secret_is_managed_and_single_keyed() {
        let secret = mirrored_secret("db-pass", "s3cret");
        assert_eq!(
            secret.metadata.labels.unwrap().get(MANAGED_LABEL).unwrap(),
            "true"
        );
        let data = secret.string_data.unwrap();
        assert_eq!(data.get(SECRET_KEY).unwrap(), "s3cret");
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn regcred_secret_is_dockerconfigjson_and_unlabelled() {
        let secret = regcred_secret(b"{\"auths\":{}}".to_vec());
        assert_eq!(
            secret.type_.as_deref(),
            Some("kubernetes.io/dockerconfigjson")
        );
        assert!(secret.metadata.labels.is_none());
        assert!(secret.data.unwrap().contains_key(".dockerconfigjson"));
    }

    #[test]
    fn stateful_set_mounts_data_volume() {
        let workload = ManagedWorkload {
            name: "pg",
            image: "postgres:15",
            ports: vec![ContainerPort {
                container_port: 5432,
                ..Default::default()
            }],
            command: None,
            env: vec![],
            liveness: Probe {
                exec: Some(ExecAction {
                    command: Some(vec!["pg_isready".into()]),
                }),
                ..Default::default()
            },
            readiness: Probe::default(),
            volume: Some(ManagedVolume {
                mount_path: "/var/lib/postgresql",
                size: "1Gi",
            }),
        };
        let sts = managed_stateful_set(workload);
        let spec = sts.spec.unwrap();
        let claim = &spec.volume_claim_templates.unwrap()[0];
        assert_eq!(claim.metadata.name.as_deref(), Some("data"));
        let requests = claim
            .spec
            .as_ref()
            .unwrap()
            .resources
            .as_ref()
            .unwrap()
            .requests
            .as_ref()
            .unwrap();
        assert_eq!(requests.get("storage").unwrap().0, "1Gi");
        let mounts = spec.template.spec.unwrap().containers[0]
            .volume_mounts
            .clone()
            .unwrap();
        assert_eq!(mounts[0].mount_path, "/var/lib/postgresql");
    }
}
