use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Resource, ResourceExt};
use ldp_models::validation::sanitize_secret_name;
use ldp_models::{NewSecret, Project, ProjectInfo, Secret};
use ldp_storage::{ProjectEntity, Storage, secret::NewSecret as NewSecretRow};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::core::{Authentication, Core, ManagedServices, Services};
use crate::errors::{ServerError, ServerResult};
use crate::k8s::{Kube, NAMESPACE_LABEL, managed_selector, resources};
use crate::util::promise::Promise;
use crate::util::random::generate_invite_code;

#[async_trait]
pub trait Projects: Send + Sync {
    async fn find_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> ServerResult<Vec<Project>>;
    async fn create_project(
        &self,
        project: Project,
        auth: &Authentication,
    ) -> ServerResult<Project>;
    async fn get_project_info(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<ProjectInfo>;
    /// Rotates the invite code; the id itself is immutable.
    async fn regenerate_invite_code(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<ProjectInfo>;
    async fn delete_project(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn get_user_projects(
        &self,
        auth: &Authentication,
    ) -> ServerResult<Vec<Project>>;
    async fn get_participants(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<String>>;
    async fn add_participant(
        &self,
        id: &str,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn remove_participant(
        &self,
        id: &str,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn join_project(
        &self,
        invite_code: &str,
        auth: &Authentication,
    ) -> ServerResult<Project>;
    async fn get_secrets(
        &self,
        project_id: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<Secret>>;
    async fn create_secret(
        &self,
        project_id: &str,
        secret: NewSecret,
        auth: &Authentication,
    ) -> ServerResult<Secret>;
    async fn delete_secret(
        &self,
        project_id: &str,
        name: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    /// Membership gate used by every project-scoped operation. A
    /// non-participant gets `NotFound`, never `Forbidden`, so existence
    /// of foreign projects does not leak.
    async fn check_access(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()>;
    async fn remove_orphan_namespaces(&self, checked: &HashSet<String>);
}

#[derive(Debug, Clone)]
pub struct ProjectsConfig {
    pub domain: String,
    pub tls_enabled: bool,
    pub tls_cluster_issuer: String,
}

pub struct ProjectsImpl {
    storage: Storage,
    kube: Kube,
    cfg: ProjectsConfig,
    services: OnceLock<Arc<dyn Services>>,
    managed_services: OnceLock<Arc<dyn ManagedServices>>,
}

/// Services and ManagedServices are delivered through the core promise
/// once the whole aggregate exists; see `bootstrap`.
pub fn init_projects(
    storage: Storage,
    kube: Kube,
    cfg: ProjectsConfig,
    core: &Promise<Core>,
) -> Arc<ProjectsImpl> {
    let projects = Arc::new(ProjectsImpl {
        storage,
        kube,
        cfg,
        services: OnceLock::new(),
        managed_services: OnceLock::new(),
    });
    let wired = Arc::clone(&projects);
    core.on_resolved(move |core| {
        let _ = wired.services.set(Arc::clone(&core.services));
        let _ = wired
            .managed_services
            .set(Arc::clone(&core.managed_services));
    });
    projects
}

impl ProjectsImpl {
    fn services(&self) -> ServerResult<&Arc<dyn Services>> {
        self.services
            .get()
            .ok_or_else(|| ServerError::internal("core is not wired yet"))
    }

    fn managed_services(&self) -> ServerResult<&Arc<dyn ManagedServices>> {
        self.managed_services
            .get()
            .ok_or_else(|| ServerError::internal("core is not wired yet"))
    }

    async fn apply_project_namespace(&self, project: &str) -> ServerResult<()> {
        let namespace = resources::namespace(project);
        self.kube
            .apply(&self.kube.namespaces(), project, &namespace)
            .await?;
        debug!(project, "namespace applied");
        Ok(())
    }

    async fn apply_tls_certificate(&self, project: &str) -> ServerResult<()> {
        let manifest = resources::certificate_manifest(
            project,
            &self.cfg.domain,
            &self.cfg.tls_cluster_issuer,
        );
        let name = resources::certificate_name(project);
        self.kube
            .apply_dynamic(&self.kube.certificates(project), &name, &manifest)
            .await?;
        debug!(project, "TLS certificate applied");
        Ok(())
    }

    async fn delete_tls_certificate(&self, project: &str) -> ServerResult<()> {
        let name = resources::certificate_name(project);
        self.kube
            .delete_ignore_not_found(&self.kube.certificates(project), &name)
            .await?;
        Ok(())
    }

    async fn apply_cluster_secret(
        &self,
        project: &str,
        name: &str,
        value: &str,
    ) -> ServerResult<()> {
        let cluster_name = sanitize_secret_name(name);
        let secret = resources::mirrored_secret(&cluster_name, value);
        self.kube
            .apply(&self.kube.secrets(project), &cluster_name, &secret)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Projects for ProjectsImpl {
    async fn find_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> ServerResult<Vec<Project>> {
        let entities = self.storage.projects().find_all(limit, offset).await?;
        Ok(entities
            .into_iter()
            .map(|e| Project { id: e.id })
            .collect())
    }

    async fn create_project(
        &self,
        project: Project,
        auth: &Authentication,
    ) -> ServerResult<Project> {
        project.validate()?;
        if self.storage.projects().exists_by_id(&project.id).await? {
            return Err(ServerError::bad_request(
                "project with this name already exists",
            ));
        }
        let record = ProjectEntity {
            id: project.id.clone(),
            invite_code: generate_invite_code(),
        };
        self.storage
            .execute_in_transaction(|tx| async move {
                tx.projects().create_new(&record).await?;
                tx.projects()
                    .add_participant(&record.id, &auth.username)
                    .await?;
                self.apply_project_namespace(&record.id).await?;
                if self.cfg.tls_enabled {
                    self.apply_tls_certificate(&record.id).await?;
                }
                Ok::<_, ServerError>(())
            })
            .await?;
        info!(project = %project.id, "project created");
        Ok(project)
    }

    async fn get_project_info(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<ProjectInfo> {
        self.check_access(id, auth).await?;
        let record = self.storage.projects().find_by_id(id).await?;
        let participants =
            self.storage.projects().get_participants(id).await?;
        let services =
            self.services()?.get_project_services(id, auth).await?;
        let managed_services = self
            .managed_services()?
            .get_project_managed_services(id, auth)
            .await?;
        Ok(ProjectInfo {
            id: record.id,
            invite_code: record.invite_code,
            participants,
            services,
            managed_services,
        })
    }

    async fn regenerate_invite_code(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<ProjectInfo> {
        self.check_access(id, auth).await?;
        let mut record = self.storage.projects().find_by_id(id).await?;
        record.invite_code = generate_invite_code();
        self.storage.projects().update(&record).await?;
        info!(project = %id, "invite code rotated");
        self.get_project_info(id, auth).await
    }

    async fn delete_project(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        self.check_access(id, auth).await?;
        self.storage
            .execute_in_transaction(|tx| async move {
                self.kube
                    .delete_ignore_not_found(&self.kube.namespaces(), id)
                    .await?;
                tx.projects().delete(id).await?;
                Ok::<_, ServerError>(())
            })
            .await?;
        info!(project = %id, "project deleted");
        Ok(())
    }

    async fn get_user_projects(
        &self,
        auth: &Authentication,
    ) -> ServerResult<Vec<Project>> {
        let entities = self
            .storage
            .projects()
            .find_user_projects(&auth.username)
            .await?;
        Ok(entities
            .into_iter()
            .map(|e| Project { id: e.id })
            .collect())
    }

    async fn get_participants(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<String>> {
        self.check_access(id, auth).await?;
        Ok(self.storage.projects().get_participants(id).await?)
    }

    async fn add_participant(
        &self,
        id: &str,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        self.check_access(id, auth).await?;
        self.storage.projects().add_participant(id, username).await?;
        info!(project = %id, username, "participant added");
        Ok(())
    }

    async fn remove_participant(
        &self,
        id: &str,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        self.check_access(id, auth).await?;
        self.storage
            .projects()
            .remove_participant(id, username)
            .await?;
        info!(project = %id, username, "participant removed");
        Ok(())
    }

    async fn join_project(
        &self,
        invite_code: &str,
        auth: &Authentication,
    ) -> ServerResult<Project> {
        let record = self
            .storage
            .projects()
            .find_by_invite_code(invite_code)
            .await?;
        self.storage
            .projects()
            .add_participant(&record.id, &auth.username)
            .await?;
        info!(project = %record.id, username = %auth.username, "user joined project");
        Ok(Project { id: record.id })
    }

    async fn get_secrets(
        &self,
        project_id: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<Secret>> {
        self.check_access(project_id, auth).await?;
        let entities =
            self.storage.secrets().find_by_project_id(project_id).await?;
        Ok(entities
            .into_iter()
            .map(|e| Secret {
                name: e.name,
                managed_service_id: e.managed_service_id,
            })
            .collect())
    }

    async fn create_secret(
        &self,
        project_id: &str,
        secret: NewSecret,
        auth: &Authentication,
    ) -> ServerResult<Secret> {
        self.check_access(project_id, auth).await?;
        secret.validate()?;
        let exists = self
            .storage
            .secrets()
            .exists_by_project_id_and_name(project_id, &secret.name)
            .await?;
        if exists {
            return Err(ServerError::bad_request(format!(
                "Secret {} already exists in the project",
                secret.name
            )));
        }
        let row = NewSecretRow {
            project_id: project_id.to_string(),
            name: secret.name.clone(),
            value: secret.value.clone(),
            managed_service_id: None,
        };
        self.storage
            .execute_in_transaction(|tx| {
                let row = row.clone();
                let secret = secret.clone();
                async move {
                    tx.secrets().create_new(&row).await?;
                    self.apply_cluster_secret(
                        project_id,
                        &secret.name,
                        &secret.value,
                    )
                    .await?;
                    Ok::<_, ServerError>(())
                }
            })
            .await?;
        info!(project = %project_id, secret = %secret.name, "secret created");
        Ok(Secret {
            name: secret.name,
            managed_service_id: None,
        })
    }

    async fn delete_secret(
        &self,
        project_id: &str,
        name: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        self.check_access(project_id, auth).await?;
        let existing = match self
            .storage
            .secrets()
            .find_by_project_id_and_name(project_id, name)
            .await
        {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if existing.managed_service_id.is_some() {
            return Err(ServerError::forbidden(
                "Managed service password secret deletion is forbidden",
            ));
        }
        self.storage
            .secrets()
            .delete_by_project_id_and_name(project_id, name)
            .await?;
        let cluster_name = sanitize_secret_name(name);
        if let Err(err) = self
            .kube
            .delete_ignore_not_found(
                &self.kube.secrets(project_id),
                &cluster_name,
            )
            .await
        {
            warn!(error = %err, secret = %cluster_name, "failed to delete secret from the cluster");
        }
        info!(project = %project_id, secret = %name, "secret deleted");
        Ok(())
    }

    async fn check_access(
        &self,
        id: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        if auth.is_service_account() {
            return Ok(());
        }
        let is_participant = self
            .storage
            .projects()
            .is_participant(id, &auth.username)
            .await?;
        if !is_participant {
            return Err(ServerError::not_found(format!(
                "cannot find project with id {id}"
            )));
        }
        Ok(())
    }

    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()> {
        self.apply_project_namespace(project_id).await?;

        if self.cfg.tls_enabled {
            self.apply_tls_certificate(project_id).await?;
        } else {
            self.delete_tls_certificate(project_id).await?;
        }

        let rows =
            self.storage.secrets().find_by_project_id(project_id).await?;
        for row in &rows {
            if let Err(err) = self
                .apply_cluster_secret(project_id, &row.name, &row.value)
                .await
            {
                error!(error = %err, secret = %row.name, "failed to apply project secret, skipping");
            }
        }

        let expected: HashSet<String> = rows
            .iter()
            .map(|row| sanitize_secret_name(&row.name))
            .collect();
        let secrets_api = self.kube.secrets(project_id);
        let lp = ListParams::default().labels(&managed_selector(None));
        let cluster_secrets = secrets_api.list(&lp).await?;
        for cluster_secret in cluster_secrets.items {
            let name = cluster_secret.name_any();
            if !expected.contains(&name) {
                if let Err(err) = self
                    .kube
                    .delete_ignore_not_found(&secrets_api, &name)
                    .await
                {
                    error!(error = %err, secret = %name, "failed to delete unmanaged secret, skipping");
                }
            }
        }

        debug!(project = %project_id, "project sync complete");
        Ok(())
    }

    async fn remove_orphan_namespaces(&self, checked: &HashSet<String>) {
        let api = self.kube.namespaces();
        let namespaces = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(err) => {
                error!(error = %err, "failed to list namespaces");
                return;
            }
        };
        for namespace in namespaces.items {
            let labelled = namespace
                .meta()
                .labels
                .as_ref()
                .and_then(|l| l.get(NAMESPACE_LABEL))
                .is_some_and(|v| v == "true");
            if !labelled {
                continue;
            }
            let name = namespace.name_any();
            if checked.contains(&name) {
                continue;
            }
            match self.kube.delete_ignore_not_found(&api, &name).await {
                Ok(()) => {
                    debug!(namespace = %name, "orphan namespace deleted")
                }
                Err(err) => {
                    error!(error = %err, namespace = %name, "failed to delete orphan namespace, skipping")
                }
            }
        }
    }
}
