use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{ListParams, LogParams, Patch, PatchParams};
use kube::ResourceExt;
use ldp_models::{EnvVar, EnvVarSource, Service, ServiceStatus};
use ldp_storage::{EnvVarRecord, Json, NewService, ServiceEntity, Storage};
use serde_json::json;
use tracing::{error, info, warn};
use validator::Validate;

use crate::core::status::{Evaluation, PodSnapshot, classify_newest_pod, evaluate};
use crate::core::{Authentication, LogStream, Projects};
use crate::errors::{ServerError, ServerResult};
use crate::k8s::{
    APP_LABEL, CONTAINER_NAME, Kube, MANAGED_LABEL, SERVICE_TYPE_SERVICE,
    managed_selector, resources,
};

#[async_trait]
pub trait Services: Send + Sync {
    async fn get_project_services(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<Service>>;
    async fn create_service(
        &self,
        service: Service,
        auth: &Authentication,
    ) -> ServerResult<Service>;
    async fn get_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<Service>;
    async fn update_service(
        &self,
        service: Service,
        auth: &Authentication,
    ) -> ServerResult<Service>;
    async fn delete_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn restart_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn get_service_status(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ServiceStatus>;
    async fn get_service_env_vars(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<Vec<EnvVar>>;
    async fn set_service_env_var(
        &self,
        id: i32,
        env_var: EnvVar,
        auth: &Authentication,
    ) -> ServerResult<EnvVar>;
    async fn delete_service_env_var(
        &self,
        id: i32,
        name: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn stream_service_logs(
        &self,
        id: i32,
        replica: usize,
        auth: &Authentication,
    ) -> ServerResult<LogStream>;
    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()>;
}

pub struct ServicesImpl {
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
    domain: String,
    tls_enabled: bool,
}

pub fn init_services(
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
    domain: String,
    tls_enabled: bool,
) -> Arc<ServicesImpl> {
    Arc::new(ServicesImpl {
        projects,
        storage,
        kube,
        domain,
        tls_enabled,
    })
}

fn env_from_record(record: &EnvVarRecord) -> ServerResult<EnvVar> {
    let source = match (&record.value, &record.secret) {
        (Some(value), None) => EnvVarSource::Value {
            value: value.clone(),
        },
        (None, Some(secret)) => EnvVarSource::Secret {
            secret: secret.clone(),
        },
        _ => {
            return Err(ServerError::internal(
                "env var must carry exactly one of value or secret",
            ));
        }
    };
    Ok(EnvVar {
        name: record.name.clone(),
        source,
    })
}

fn env_to_record(env_var: &EnvVar) -> EnvVarRecord {
    match &env_var.source {
        EnvVarSource::Value { value } => EnvVarRecord {
            name: env_var.name.clone(),
            value: Some(value.clone()),
            secret: None,
        },
        EnvVarSource::Secret { secret } => EnvVarRecord {
            name: env_var.name.clone(),
            value: None,
            secret: Some(secret.clone()),
        },
    }
}

fn entity_to_model(entity: &ServiceEntity) -> ServerResult<Service> {
    let env_vars = entity
        .env_vars
        .0
        .iter()
        .map(env_from_record)
        .collect::<ServerResult<Vec<_>>>()?;
    Ok(Service {
        id: Some(entity.id),
        project: entity.project_id.clone(),
        name: entity.name.clone(),
        image: entity.image.clone(),
        port: entity.port,
        public_api_prefix: entity.public_api_prefix.clone(),
        env_vars,
        replicas: entity.replicas,
    })
}

impl ServicesImpl {
    /// Apply the derived cluster objects in dependency order: Service,
    /// Ingress (or its removal), Deployment. A failed Deployment apply
    /// triggers best-effort compensation in reverse order; compensation
    /// errors never mask the original failure.
    async fn apply_service_workload(
        &self,
        service: &Service,
    ) -> ServerResult<()> {
        let project = service.project.as_str();
        let svc_api = self.kube.services(project);
        let cluster_svc = resources::app_service(service);
        self.kube
            .apply(&svc_api, &service.name, &cluster_svc)
            .await?;

        let ingress_api = self.kube.ingresses(project);
        let ingress_name = resources::ingress_name(&service.name);
        if service.public_api_prefix.is_some() {
            let ingress = resources::app_ingress(
                service,
                &self.domain,
                self.tls_enabled,
            );
            if let Err(err) =
                self.kube.apply(&ingress_api, &ingress_name, &ingress).await
            {
                self.compensate_service(project, &service.name).await;
                return Err(err.into());
            }
        } else if let Err(err) = self
            .kube
            .delete_ignore_not_found(&ingress_api, &ingress_name)
            .await
        {
            self.compensate_service(project, &service.name).await;
            return Err(err.into());
        }

        let deployment = resources::app_deployment(service);
        if let Err(err) = self
            .kube
            .apply(&self.kube.deployments(project), &service.name, &deployment)
            .await
        {
            self.compensate_ingress(project, &ingress_name).await;
            self.compensate_service(project, &service.name).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn compensate_service(&self, project: &str, name: &str) {
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(&self.kube.services(project), name)
            .await
        {
            error!(error = %err, service = %name, "failed to roll back cluster service, skipping");
        }
    }

    async fn compensate_ingress(&self, project: &str, name: &str) {
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(&self.kube.ingresses(project), name)
            .await
        {
            error!(error = %err, ingress = %name, "failed to roll back ingress, skipping");
        }
    }

    async fn delete_service_workload(
        &self,
        project: &str,
        name: &str,
    ) -> ServerResult<()> {
        self.kube
            .delete_ignore_not_found(&self.kube.deployments(project), name)
            .await?;
        self.kube
            .delete_ignore_not_found(
                &self.kube.ingresses(project),
                &resources::ingress_name(name),
            )
            .await?;
        self.kube
            .delete_ignore_not_found(&self.kube.services(project), name)
            .await?;
        Ok(())
    }

    async fn save_env_vars(
        &self,
        entity: &ServiceEntity,
        env_vars: Vec<EnvVar>,
    ) -> ServerResult<()> {
        let mut updated = entity.clone();
        updated.env_vars =
            Json(env_vars.iter().map(env_to_record).collect::<Vec<_>>());
        let service = entity_to_model(&updated)?;
        self.storage
            .execute_in_transaction(|tx| async move {
                tx.services().update(&updated).await?;
                self.apply_service_workload(&service).await?;
                Ok::<_, ServerError>(())
            })
            .await
    }

    /// Pods of the newest template revision, ordered by creation time.
    fn current_generation_pods(
        pods: Vec<k8s_openapi::api::core::v1::Pod>,
    ) -> Vec<k8s_openapi::api::core::v1::Pod> {
        let newest_hash = pods
            .iter()
            .max_by_key(|p| {
                p.metadata.creation_timestamp.as_ref().map(|t| t.0)
            })
            .and_then(|p| {
                p.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get("pod-template-hash").cloned())
            });
        let mut pods: Vec<_> = pods
            .into_iter()
            .filter(|p| {
                match (&newest_hash, p.metadata.labels.as_ref()) {
                    (Some(hash), Some(labels)) => {
                        labels.get("pod-template-hash") == Some(hash)
                    }
                    (None, _) => true,
                    (Some(_), None) => false,
                }
            })
            .collect();
        pods.sort_by_key(|p| {
            p.metadata.creation_timestamp.as_ref().map(|t| t.0)
        });
        pods
    }
}

#[async_trait]
impl Services for ServicesImpl {
    async fn get_project_services(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<Service>> {
        self.projects.check_access(project, auth).await?;
        let entities =
            self.storage.services().find_by_project_id(project).await?;
        entities.iter().map(entity_to_model).collect()
    }

    async fn create_service(
        &self,
        mut service: Service,
        auth: &Authentication,
    ) -> ServerResult<Service> {
        self.projects.check_access(&service.project, auth).await?;
        service.validate()?;
        let exists = self
            .storage
            .services()
            .exists_by_project_id_and_name(&service.project, &service.name)
            .await?;
        if exists {
            return Err(ServerError::bad_request(
                "service with this name already exists in the project",
            ));
        }
        let row = NewService {
            project_id: service.project.clone(),
            name: service.name.clone(),
            image: service.image.clone(),
            port: service.port,
            public_api_prefix: service.public_api_prefix.clone(),
            env_vars: service.env_vars.iter().map(env_to_record).collect(),
            replicas: service.replicas,
        };
        let id = self
            .storage
            .execute_in_transaction(|tx| {
                let service = service.clone();
                async move {
                    let id = tx.services().create_new(&row).await?;
                    self.apply_service_workload(&service).await?;
                    Ok::<_, ServerError>(id)
                }
            })
            .await?;
        service.id = Some(id);
        info!(project = %service.project, service = %service.name, "service created");
        Ok(service)
    }

    async fn get_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<Service> {
        let entity = self.storage.services().find_by_id(id).await?;
        self.projects.check_access(&entity.project_id, auth).await?;
        entity_to_model(&entity)
    }

    async fn update_service(
        &self,
        service: Service,
        auth: &Authentication,
    ) -> ServerResult<Service> {
        let id = service
            .id
            .ok_or_else(|| ServerError::bad_request("service id is required"))?;
        let existing = self.get_service(id, auth).await?;
        if existing.project != service.project {
            return Err(ServerError::bad_request(
                "Project field cannot be updated",
            ));
        }
        if existing.name != service.name {
            return Err(ServerError::bad_request(
                "Service name cannot be updated",
            ));
        }
        service.validate()?;
        let updated = ServiceEntity {
            id,
            project_id: service.project.clone(),
            name: service.name.clone(),
            image: service.image.clone(),
            port: service.port,
            public_api_prefix: service.public_api_prefix.clone(),
            env_vars: Json(
                service.env_vars.iter().map(env_to_record).collect(),
            ),
            replicas: service.replicas,
        };
        self.storage
            .execute_in_transaction(|tx| {
                let service = service.clone();
                async move {
                    tx.services().update(&updated).await?;
                    self.apply_service_workload(&service).await?;
                    Ok::<_, ServerError>(())
                }
            })
            .await?;
        info!(project = %service.project, service = %service.name, "service updated");
        Ok(service)
    }

    async fn delete_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let service = match self.get_service(id, auth).await {
            Ok(service) => service,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        self.storage
            .execute_in_transaction(|tx| {
                let service = service.clone();
                async move {
                    tx.services().delete(id).await?;
                    self.delete_service_workload(
                        &service.project,
                        &service.name,
                    )
                    .await?;
                    Ok::<_, ServerError>(())
                }
            })
            .await?;
        info!(project = %service.project, service = %service.name, "service deleted");
        Ok(())
    }

    async fn restart_service(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let service = self.get_service(id, auth).await?;
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt":
                                Utc::now().to_rfc3339(),
                        },
                    },
                },
            },
        });
        self.kube
            .deployments(&service.project)
            .patch(
                &service.name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        info!(project = %service.project, service = %service.name, "rolling restart triggered");
        Ok(())
    }

    async fn get_service_status(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<ServiceStatus> {
        let service = self.get_service(id, auth).await?;
        let deployment = self
            .kube
            .deployments(&service.project)
            .get(&service.name)
            .await?;
        let status = match evaluate(&(&deployment).into()) {
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
                        "failed to find a pod for service {}",
                        service.name
                    ))
                })?
            }
        };
        Ok(ServiceStatus { id, status })
    }

    async fn get_service_env_vars(
        &self,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<Vec<EnvVar>> {
        Ok(self.get_service(id, auth).await?.env_vars)
    }

    async fn set_service_env_var(
        &self,
        id: i32,
        env_var: EnvVar,
        auth: &Authentication,
    ) -> ServerResult<EnvVar> {
        let entity = self.storage.services().find_by_id(id).await?;
        self.projects.check_access(&entity.project_id, auth).await?;
        let mut env_vars = entity
            .env_vars
            .0
            .iter()
            .map(env_from_record)
            .collect::<ServerResult<Vec<_>>>()?;
        env_vars.retain(|existing| existing.name != env_var.name);
        env_vars.push(env_var.clone());
        self.save_env_vars(&entity, env_vars).await?;
        Ok(env_var)
    }

    async fn delete_service_env_var(
        &self,
        id: i32,
        name: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let entity = self.storage.services().find_by_id(id).await?;
        self.projects.check_access(&entity.project_id, auth).await?;
        let mut env_vars = entity
            .env_vars
            .0
            .iter()
            .map(env_from_record)
            .collect::<ServerResult<Vec<_>>>()?;
        env_vars.retain(|existing| existing.name != name);
        self.save_env_vars(&entity, env_vars).await
    }

    async fn stream_service_logs(
        &self,
        id: i32,
        replica: usize,
        auth: &Authentication,
    ) -> ServerResult<LogStream> {
        let service = self.get_service(id, auth).await?;
        let pods_api = self.kube.pods(&service.project);
        let lp = ListParams::default()
            .labels(&format!("{APP_LABEL}={}", service.name));
        let pods = pods_api.list(&lp).await?.items;
        let current = Self::current_generation_pods(pods);
        let pod = current.get(replica).ok_or_else(|| {
            ServerError::not_found(format!(
                "replica {replica} of service {} not found",
                service.name
            ))
        })?;
        let pod_name = pod.name_any();
        let params = LogParams {
            follow: true,
            container: Some(CONTAINER_NAME.to_string()),
            ..Default::default()
        };
        let stream = pods_api.log_stream(&pod_name, &params).await?;
        Ok(Box::pin(stream))
    }

    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()> {
        let services = self
            .get_project_services(project_id, &Authentication::service_account())
            .await?;
        let known: HashSet<&str> =
            services.iter().map(|s| s.name.as_str()).collect();

        for service in &services {
            if let Err(err) = self.apply_service_workload(service).await {
                error!(error = %err, service = %service.name, "failed to apply service workload, skipping");
            }
        }

        let deployments_api = self.kube.deployments(project_id);
        let deployments =
            deployments_api.list(&ListParams::default()).await?;
        for deployment in deployments.items {
            let name = deployment.name_any();
            let managed = deployment
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(MANAGED_LABEL))
                .is_some_and(|v| v == "true");
            if managed && !known.contains(name.as_str()) {
                if let Err(err) =
                    self.delete_service_workload(project_id, &name).await
                {
                    warn!(error = %err, deployment = %name, "failed to delete orphan workload, skipping");
                }
            }
        }

        let services_api = self.kube.services(project_id);
        let lp = ListParams::default()
            .labels(&managed_selector(Some(SERVICE_TYPE_SERVICE)));
        let cluster_services = services_api.list(&lp).await?;
        for cluster_service in cluster_services.items {
            let name = cluster_service.name_any();
            if !known.contains(name.as_str()) {
                if let Err(err) = self
                    .kube
                    .delete_ignore_not_found(&services_api, &name)
                    .await
                {
                    warn!(error = %err, service = %name, "failed to delete orphan cluster service, skipping");
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
    fn env_record_roundtrip() {
        let env = EnvVar {
            name: "PW".into(),
            source: EnvVarSource::Secret {
                secret: "DB_PASS".into(),
            },
        };
        let record = env_to_record(&env);
        assert_eq!(record.secret.as_deref(), Some("DB_PASS"));
        assert_eq!(env_from_record(&record).unwrap(), env);
    }

    #[test]
    fn env_record_with_both_sources_is_rejected() {
        let record = EnvVarRecord {
            name: "X".into(),
            value: Some("a".into()),
            secret: Some("b".into()),
        };
        assert!(env_from_record(&record).is_err());
    }

    #[test]
    fn entity_to_model_carries_all_fields() {
        let entity = ServiceEntity {
            id: 4,
            project_id: "p".into(),
            name: "api".into(),
            image: "nginx:1".into(),
            port: 8080,
            public_api_prefix: Some("/api".into()),
            env_vars: Json(vec![EnvVarRecord {
                name: "A".into(),
                value: Some("1".into()),
                secret: None,
            }]),
            replicas: 2,
        };
        let model = entity_to_model(&entity).unwrap();
        assert_eq!(model.id, Some(4));
        assert_eq!(model.replicas, 2);
        assert_eq!(model.env_vars.len(), 1);
    }
}
