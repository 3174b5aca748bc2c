use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ContainerPort, EnvVar as K8sEnvVar, EnvVarSource as K8sEnvVarSource,
    ExecAction, ObjectFieldSelector, Probe, SecretKeySelector,
};
use kube::ResourceExt;
use kube::api::ListParams;
use ldp_models::{ManagedService, ManagedServiceType, ServiceStatus};
use ldp_storage::{NewManagedService, Storage, secret::NewSecret as NewSecretRow};
use tracing::{error, info, warn};
use validator::Validate;

use crate::core::status::{
    Evaluation, PodSnapshot, classify_newest_pod, evaluate,
};
use crate::core::{Authentication, Projects};
use crate::errors::{ServerError, ServerResult};
use crate::k8s::{
    APP_LABEL, Kube, SECRET_KEY, SERVICE_TYPE_MANAGED, managed_selector,
    resources,
};
use crate::util::random::generate_password;

/// Static parameters of each supported data-store type.
pub(crate) struct ManagedTypeParams {
    pub image: &'static str,
    pub username: &'static str,
    pub pod_port: i32,
    pub volume_path: Option<&'static str>,
    pub volume_size: &'static str,
}

pub(crate) fn type_params(
    service_type: ManagedServiceType,
) -> &'static ManagedTypeParams {
    match service_type {
        ManagedServiceType::Postgres => &ManagedTypeParams {
            image: "postgres:15",
            username: "postgres",
            pod_port: 5432,
            volume_path: Some("/var/lib/postgresql"),
            volume_size: "1Gi",
        },
        ManagedServiceType::Mysql => &ManagedTypeParams {
            image: "mysql:8",
            username: "root",
            pod_port: 3306,
            volume_path: Some("/var/lib/mysql"),
            volume_size: "1Gi",
        },
        ManagedServiceType::Mongo => &ManagedTypeParams {
            image: "mongo:6",
            username: "root",
            pod_port: 27017,
            volume_path: Some("/var/lib/mongodb"),
            volume_size: "1Gi",
        },
        ManagedServiceType::Redis => &ManagedTypeParams {
            image: "redis:7",
            username: "",
            pod_port: 6379,
            volume_path: Some("/data"),
            volume_size: "500Mi",
        },
        ManagedServiceType::Rabbitmq => &ManagedTypeParams {
            image: "rabbitmq:3-management",
            username: "guest",
            pod_port: 5672,
            volume_path: None,
            volume_size: "",
        },
    }
}

pub(crate) fn password_secret_name(service_name: &str) -> String {
    format!("{service_name}-password")
}

fn erlang_cookie_secret_name(service_name: &str) -> String {
    format!("{service_name}-erlang-cookie")
}

fn secret_env(name: &str, secret_name: String) -> K8sEnvVar {
    K8sEnvVar {
        name: name.to_string(),
        value_from: Some(K8sEnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                key: SECRET_KEY.to_string(),
                name: secret_name.into(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn value_env(name: &str, value: &str) -> K8sEnvVar {
    K8sEnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn field_ref_env(name: &str, field_path: &str) -> K8sEnvVar {
    K8sEnvVar {
        name: name.to_string(),
        value_from: Some(K8sEnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn exec_probe(command: Vec<&str>, initial_delay: i32, timeout: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(command.into_iter().map(String::from).collect()),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(20),
        timeout_seconds: Some(timeout),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn shell_probe(command: &str, initial_delay: i32) -> Probe {
    exec_probe(vec!["/bin/sh", "-c", command], initial_delay, 5)
}

#[async_trait]
pub trait ManagedServices: Send + Sync {
    async fn get_project_managed_services(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<ManagedService>>;
    async fn create_managed_service(
        &self,
        service: ManagedService,
        auth: &Authentication,
    ) -> ServerResult<ManagedService>;
    async fn get_managed_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ManagedService>;
    async fn delete_managed_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn get_managed_service_status(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ServiceStatus>;
    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()>;
}

pub struct ManagedServicesImpl {
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
}

pub fn init_managed_services(
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
) -> Arc<ManagedServicesImpl> {
    Arc::new(ManagedServicesImpl {
        projects,
        storage,
        kube,
    })
}

impl ManagedServicesImpl {
    /// Assemble the per-type StatefulSet; pure so the derived shapes are
    /// testable without a cluster.
    fn build_stateful_set(
        service: &ManagedService,
    ) -> k8s_openapi::api::apps::v1::StatefulSet {
        let params = type_params(service.service_type);
        let name = service.name.as_str();
        let password_secret = password_secret_name(name);

        let pod_port = ContainerPort {
            container_port: params.pod_port,
            ..Default::default()
        };

        let (ports, command, env, liveness, readiness) = match service
            .service_type
        {
            ManagedServiceType::Postgres => {
                let port_arg = format!("--port={}", params.pod_port);
                let probe = exec_probe(
                    vec!["pg_isready", port_arg.as_str()],
                    20,
                    5,
                );
                let mut readiness = probe.clone();
                readiness.initial_delay_seconds = Some(30);
                (
                    vec![pod_port],
                    None,
                    vec![secret_env("POSTGRES_PASSWORD", password_secret)],
                    probe,
                    readiness,
                )
            }
            ManagedServiceType::Mysql => {
                let liveness_cmd = format!(
                    "mysqladmin -u{} -p$MYSQL_ROOT_PASSWORD ping",
                    params.username
                );
                let readiness_cmd = format!(
                    "mysql -h 127.0.0.1 -u{} -p$MYSQL_ROOT_PASSWORD -e 'SELECT 1'",
                    params.username
                );
                (
                    vec![pod_port],
                    None,
                    vec![
                        secret_env("MYSQL_ROOT_PASSWORD", password_secret),
                        value_env("MYSQL_DATABASE", "db"),
                    ],
                    shell_probe(&liveness_cmd, 20),
                    shell_probe(&readiness_cmd, 30),
                )
            }
            ManagedServiceType::Mongo => {
                let liveness_cmd = format!(
                    "mongosh --port {} --username {} --password $MONGO_INITDB_ROOT_PASSWORD \
                     --eval 'db.runCommand({{ping: 1}})' --quiet",
                    params.pod_port, params.username
                );
                let readiness_cmd = format!(
                    "mongosh --port {} --username {} --password $MONGO_INITDB_ROOT_PASSWORD \
                     --eval 'db.serverStatus().ok' --quiet | grep -q 1",
                    params.pod_port, params.username
                );
                (
                    vec![pod_port],
                    None,
                    vec![
                        secret_env(
                            "MONGO_INITDB_ROOT_PASSWORD",
                            password_secret,
                        ),
                        value_env(
                            "MONGO_INITDB_ROOT_USERNAME",
                            params.username,
                        ),
                    ],
                    shell_probe(&liveness_cmd, 20),
                    shell_probe(&readiness_cmd, 30),
                )
            }
            ManagedServiceType::Redis => {
                let probe_cmd = "redis-cli --pass $REDIS_PASSWORD ping | grep -q PONG";
                (
                    vec![pod_port],
                    Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        "redis-server --appendonly yes --requirepass ${REDIS_PASSWORD}"
                            .to_string(),
                    ]),
                    vec![secret_env("REDIS_PASSWORD", password_secret)],
                    shell_probe(probe_cmd, 20),
                    shell_probe(probe_cmd, 30),
                )
            }
            ManagedServiceType::Rabbitmq => {
                let node_name = format!(
                    "rabbit@$(HOSTNAME).{name}.$(NAMESPACE).svc.cluster.local"
                );
                (
                    vec![
                        ContainerPort {
                            container_port: 5672,
                            name: Some("amqp".to_string()),
                            ..Default::default()
                        },
                        ContainerPort {
                            container_port: 15672,
                            name: Some("http".to_string()),
                            ..Default::default()
                        },
                        ContainerPort {
                            container_port: 4369,
                            ..Default::default()
                        },
                    ],
                    None,
                    vec![
                        field_ref_env("HOSTNAME", "metadata.name"),
                        field_ref_env("NODE_NAME", "metadata.name"),
                        field_ref_env("NAMESPACE", "metadata.namespace"),
                        value_env("RABBITMQ_USE_LONGNAME", "true"),
                        value_env("RABBITMQ_NODENAME", &node_name),
                        value_env("RABBITMQ_DEFAULT_USER", params.username),
                        secret_env("RABBITMQ_DEFAULT_PASS", password_secret),
                        secret_env(
                            "RABBITMQ_ERLANG_COOKIE",
                            erlang_cookie_secret_name(name),
                        ),
                    ],
                    exec_probe(
                        vec![
                            "rabbitmq-diagnostics",
                            "status",
                            "--timeout",
                            "10",
                        ],
                        20,
                        15,
                    ),
                    exec_probe(
                        vec!["rabbitmq-diagnostics", "ping", "--timeout", "10"],
                        30,
                        10,
                    ),
                )
            }
        };

        resources::managed_stateful_set(resources::ManagedWorkload {
            name,
            image: params.image,
            ports,
            command,
            env,
            liveness,
            readiness,
            volume: params.volume_path.map(|path| resources::ManagedVolume {
                mount_path: path,
                size: params.volume_size,
            }),
        })
    }

    /// Create the owned secret row and its cluster mirror unless the row
    /// already exists (the sync path reuses the stored password).
    async fn ensure_owned_secret(
        &self,
        storage: &Storage,
        service: &ManagedService,
        secret_name: String,
    ) -> ServerResult<()> {
        let service_id = service.id.ok_or_else(|| {
            ServerError::internal("managed service id missing")
        })?;
        let exists = storage
            .secrets()
            .exists_by_project_id_and_name(&service.project, &secret_name)
            .await?;
        if exists {
            return Ok(());
        }
        let password = generate_password();
        let row = NewSecretRow {
            project_id: service.project.clone(),
            name: secret_name.clone(),
            value: password.clone(),
            managed_service_id: Some(service_id),
        };
        storage
            .execute_in_transaction(|tx| {
                let project = service.project.clone();
                let secret_name = secret_name.clone();
                let password = password.clone();
                async move {
                    tx.secrets().create_new(&row).await?;
                    let secret = resources::mirrored_secret(
                        &secret_name,
                        &password,
                    );
                    self.kube
                        .apply(
                            &self.kube.secrets(&project),
                            &secret_name,
                            &secret,
                        )
                        .await?;
                    Ok::<_, ServerError>(())
                }
            })
            .await
    }

    async fn create_managed_workload(
        &self,
        storage: &Storage,
        service: &ManagedService,
    ) -> ServerResult<()> {
        let params = type_params(service.service_type);
        let project = service.project.as_str();
        let name = service.name.as_str();

        let cluster_svc = resources::managed_service(name, params.pod_port);
        self.kube
            .apply(&self.kube.services(project), name, &cluster_svc)
            .await?;

        let mut owned_secrets = vec![password_secret_name(name)];
        if service.service_type == ManagedServiceType::Rabbitmq {
            owned_secrets.push(erlang_cookie_secret_name(name));
        }
        for secret_name in &owned_secrets {
            if let Err(err) = self
                .ensure_owned_secret(storage, service, secret_name.clone())
                .await
            {
                self.compensate_cluster_service(project, name).await;
                return Err(err);
            }
        }

        let stateful_set = Self::build_stateful_set(service);
        if let Err(err) = self
            .kube
            .apply(&self.kube.stateful_sets(project), name, &stateful_set)
            .await
        {
            for secret_name in &owned_secrets {
                self.compensate_cluster_secret(project, secret_name).await;
            }
            self.compensate_cluster_service(project, name).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn compensate_cluster_service(&self, project: &str, name: &str) {
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(&self.kube.services(project), name)
            .await
        {
            error!(error = %err, service = %name, "failed to roll back cluster service, skipping");
        }
    }

    async fn compensate_cluster_secret(&self, project: &str, name: &str) {
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(&self.kube.secrets(project), name)
            .await
        {
            error!(error = %err, secret = %name, "failed to roll back cluster secret, skipping");
        }
    }

    /// Cascade delete of the cluster footprint: StatefulSet, Service,
    /// owned secrets. Everything is idempotent on not-found.
    async fn delete_managed_workload(
        &self,
        project: &str,
        name: &str,
    ) -> ServerResult<()> {
        self.kube
            .delete_ignore_not_found(&self.kube.stateful_sets(project), name)
            .await?;
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(&self.kube.services(project), name)
            .await
        {
            warn!(error = %err, service = %name, "failed to delete cluster service, skipping");
        }
        for secret_name in [
            password_secret_name(name),
            erlang_cookie_secret_name(name),
        ] {
            if let Err(err) = self
                .kube
                .delete_ignore_not_found(
                    &self.kube.secrets(project),
                    &secret_name,
                )
                .await
            {
                warn!(error = %err, secret = %secret_name, "failed to delete owned secret, skipping");
            }
        }
        Ok(())
    }

    fn entity_to_model(
        entity: &ldp_storage::ManagedServiceEntity,
    ) -> ServerResult<ManagedService> {
        let service_type =
            entity.service_type.parse::<ManagedServiceType>().map_err(
                |err| ServerError::internal_wrap(err, "corrupt managed service row"),
            )?;
        Ok(ManagedService {
            id: Some(entity.id),
            project: entity.project_id.clone(),
            name: entity.name.clone(),
            service_type,
        })
    }
}

#[async_trait]
impl ManagedServices for ManagedServicesImpl {
    async fn get_project_managed_services(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<ManagedService>> {
        self.projects.check_access(project, auth).await?;
        let entities = self
            .storage
            .managed_services()
            .find_by_project_id(project)
            .await?;
        entities.iter().map(Self::entity_to_model).collect()
    }

    async fn create_managed_service(
        &self,
        mut service: ManagedService,
        auth: &Authentication,
    ) -> ServerResult<ManagedService> {
        self.projects.check_access(&service.project, auth).await?;
        service.validate()?;
        let exists = self
            .storage
            .managed_services()
            .exists_by_project_id_and_name(&service.project, &service.name)
            .await?;
        if exists {
            return Err(ServerError::bad_request(
                "managed service with this name already exists in the project",
            ));
        }
        let row = NewManagedService {
            project_id: service.project.clone(),
            name: service.name.clone(),
            service_type: service.service_type.as_str().to_string(),
        };
        let id = self
            .storage
            .execute_in_transaction(|tx| {
                let mut service = service.clone();
                async move {
                    let id =
                        tx.managed_services().create_new(&row).await?;
                    service.id = Some(id);
                    self.create_managed_workload(&tx, &service).await?;
                    Ok::<_, ServerError>(id)
                }
            })
            .await?;
        service.id = Some(id);
        info!(project = %service.project, service = %service.name, "managed service created");
        Ok(service)
    }

    async fn get_managed_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ManagedService> {
        let entity = self.storage.managed_services().find_by_id(id).await?;
        self.projects.check_access(&entity.project_id, auth).await?;
        Self::entity_to_model(&entity)
    }

    async fn delete_managed_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let entity = match self.storage.managed_services().find_by_id(id).await
        {
            Ok(entity) => entity,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        self.projects.check_access(&entity.project_id, auth).await?;
        self.storage
            .execute_in_transaction(|tx| {
                let entity = entity.clone();
                async move {
                    tx.managed_services().delete(id).await?;
                    self.delete_managed_workload(
                        &entity.project_id,
                        &entity.name,
                    )
                    .await?;
                    Ok::<_, ServerError>(())
                }
            })
            .await?;
        info!(project = %entity.project_id, service = %entity.name, "managed service deleted");
        Ok(())
    }

    async fn get_managed_service_status(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ServiceStatus> {
        let service = self.get_managed_service(id, auth).await?;
        let set = self
            .kube
            .stateful_sets(&service.project)
            .get(&service.name)
            .await?;
        let status = match evaluate(&(&set).into()) {
            Evaluation::Settled(status) => status,
            Evaluation::InspectNewestPod => {
                let lp = ListParams::default()
                    .labels(&format!("{APP_LABEL}={}", service.name));
                let pods =
                    self.kube.pods(&service.project).list(&lp).await?;
                let snapshots: Vec<PodSnapshot> =
                    pods.items.iter().map(PodSnapshot::from).collect();
                classify_newest_pod(&snapshots).ok_or_else(|| {
                    ServerError::internal(format!(
                        "failed to find a pod for managed service {}",
                        service.name
                    ))
                })?
            }
        };
        Ok(ServiceStatus { id, status })
    }

    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()> {
        let services = self
            .get_project_managed_services(
                project_id,
                &Authentication::service_account(),
            )
            .await?;
        let known: HashSet<&str> =
            services.iter().map(|s| s.name.as_str()).collect();

        for service in &services {
            if let Err(err) = self
                .create_managed_workload(&self.storage, service)
                .await
            {
                error!(error = %err, service = %service.name, "failed to apply managed workload, skipping");
            }
        }

        let sets_api = self.kube.stateful_sets(project_id);
        let lp = ListParams::default().labels(&managed_selector(None));
        let sets = sets_api.list(&lp).await?;
        for set in sets.items {
            let name = set.name_any();
            if !known.contains(name.as_str()) {
                if let Err(err) =
                    self.delete_managed_workload(project_id, &name).await
                {
                    warn!(error = %err, stateful_set = %name, "failed to delete orphan managed workload, skipping");
                }
            }
        }

        let services_api = self.kube.services(project_id);
        let lp = ListParams::default()
            .labels(&managed_selector(Some(SERVICE_TYPE_MANAGED)));
        let cluster_services = services_api.list(&lp).await?;
        for cluster_service in cluster_services.items {
            let name = cluster_service.name_any();
            if !known.contains(name.as_str()) {
                if let Err(err) = self
                    .kube
                    .delete_ignore_not_found(&services_api, &name)
                    .await
                {
                    warn!(error = %err, service = %name, "failed to delete orphan managed cluster service, skipping");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_matches_supported_stores() {
        assert_eq!(type_params(ManagedServiceType::Postgres).image, "postgres:15");
        assert_eq!(type_params(ManagedServiceType::Mysql).pod_port, 3306);
        assert_eq!(type_params(ManagedServiceType::Mongo).username, "root");
        assert_eq!(
            type_params(ManagedServiceType::Redis).volume_size,
            "500Mi"
        );
        assert!(type_params(ManagedServiceType::Rabbitmq)
            .volume_path
            .is_none());
    }

    fn sample(service_type: ManagedServiceType) -> ManagedService {
        ManagedService {
            id: Some(1),
            project: "p".into(),
            name: "store".into(),
            service_type,
        }
    }

    fn container_env(
        service: &ManagedService,
    ) -> Vec<k8s_openapi::api::core::v1::EnvVar> {
        let set = ManagedServicesImpl::build_stateful_set(service);
        set.spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .containers
            .remove(0)
            .env
            .unwrap()
    }

    #[test]
    fn postgres_env_references_password_secret() {
        let env = container_env(&sample(ManagedServiceType::Postgres));
        let secret_ref = env
            .iter()
            .find(|e| e.name == "POSTGRES_PASSWORD")
            .unwrap()
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(secret_ref.key, SECRET_KEY);
        assert_eq!(
            serde_json::to_value(&secret_ref.name).unwrap(),
            "store-password"
        );
    }

    #[test]
    fn redis_runs_with_append_only_and_password() {
        let service = sample(ManagedServiceType::Redis);
        let set = ManagedServicesImpl::build_stateful_set(&service);
        let spec = set.spec.unwrap();
        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        let command = container.command.as_ref().unwrap();
        assert!(command[2].contains("--appendonly yes"));
        assert!(command[2].contains("--requirepass"));
        let claim = &spec.volume_claim_templates.as_ref().unwrap()[0];
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
        assert_eq!(requests.get("storage").unwrap().0, "500Mi");
    }

    #[test]
    fn rabbitmq_cookie_comes_from_owned_secret() {
        let env = container_env(&sample(ManagedServiceType::Rabbitmq));
        let cookie = env
            .iter()
            .find(|e| e.name == "RABBITMQ_ERLANG_COOKIE")
            .unwrap();
        let secret_ref = cookie
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&secret_ref.name).unwrap(),
            "store-erlang-cookie"
        );
        // No hard-coded cookie value anywhere in the pod spec.
        assert!(cookie.value.is_none());
    }

    #[test]
    fn rabbitmq_has_no_volume_claim() {
        let service = sample(ManagedServiceType::Rabbitmq);
        let set = ManagedServicesImpl::build_stateful_set(&service);
        assert!(set.spec.unwrap().volume_claim_templates.is_none());
    }
}
