use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ldp_models::ContainerRegistry;
use ldp_storage::{Storage, registry::NewContainerRegistry};
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::core::{Authentication, Projects};
use crate::errors::{ServerError, ServerResult};
use crate::k8s::{Kube, REGCRED_SECRET_NAME, resources};

#[async_trait]
pub trait ContainerRegistries: Send + Sync {
    async fn get_project_container_registries(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<ContainerRegistry>>;
    async fn add_container_registry(
        &self,
        project: &str,
        registry: ContainerRegistry,
        auth: &Authentication,
    ) -> ServerResult<ContainerRegistry>;
    async fn delete_container_registry(
        &self,
        project: &str,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()>;
    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()>;
}

pub struct ContainerRegistriesImpl {
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
}

pub fn init_container_registries(
    projects: Arc<dyn Projects>,
    storage: Storage,
    kube: Kube,
) -> Arc<ContainerRegistriesImpl> {
    Arc::new(ContainerRegistriesImpl {
        projects,
        storage,
        kube,
    })
}

#[derive(Serialize)]
struct RegistryAuth {
    auth: String,
}

#[derive(Serialize)]
struct DockerConfig {
    auths: HashMap<String, RegistryAuth>,
}

/// `.dockerconfigjson` body aggregating every registry credential of a
/// project.
pub fn dockerconfig_json(
    registries: &[(String, String, String)],
) -> ServerResult<Vec<u8>> {
    let auths = registries
        .iter()
        .map(|(url, username, password)| {
            let token = BASE64.encode(format!("{username}:{password}"));
            (url.clone(), RegistryAuth { auth: token })
        })
        .collect();
    Ok(serde_json::to_vec(&DockerConfig { auths })?)
}

/// Schemeless URLs are tried as https; whatever remains must parse.
pub fn is_registry_url_valid(registry_url: &str) -> bool {
    let candidate = if registry_url.starts_with("http:")
        || registry_url.starts_with("https:")
    {
        registry_url.to_string()
    } else {
        format!("https://{registry_url}")
    };
    Url::parse(&candidate).is_ok()
}

impl ContainerRegistriesImpl {
    async fn load_registries(
        &self,
        storage: &Storage,
        project: &str,
    ) -> ServerResult<Vec<(String, String, String)>> {
        let entities = storage
            .container_registries()
            .find_by_project_id(project)
            .await?;
        Ok(entities
            .into_iter()
            .map(|e| (e.url, e.username, e.password))
            .collect())
    }

    /// Regenerate the whole pull secret from the current row set; the
    /// same path backs mutations and the reconciler.
    async fn apply_registries_secret(
        &self,
        storage: &Storage,
        project: &str,
    ) -> ServerResult<()> {
        let registries = self.load_registries(storage, project).await?;
        let body = dockerconfig_json(&registries)?;
        let secret = resources::regcred_secret(body);
        self.kube
            .apply(
                &self.kube.secrets(project),
                REGCRED_SECRET_NAME,
                &secret,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRegistries for ContainerRegistriesImpl {
    async fn get_project_container_registries(
        &self,
        project: &str,
        auth: &Authentication,
    ) -> ServerResult<Vec<ContainerRegistry>> {
        self.projects.check_access(project, auth).await?;
        let entities = self
            .storage
            .container_registries()
            .find_by_project_id(project)
            .await?;
        Ok(entities
            .into_iter()
            .map(|e| ContainerRegistry {
                id: Some(e.id),
                url: e.url,
                username: e.username,
                password: None,
            })
            .collect())
    }

    async fn add_container_registry(
        &self,
        project: &str,
        mut registry: ContainerRegistry,
        auth: &Authentication,
    ) -> ServerResult<ContainerRegistry> {
        self.projects.check_access(project, auth).await?;
        if !is_registry_url_valid(&registry.url) {
            return Err(ServerError::bad_request(
                "Invalid container registry URL",
            ));
        }
        let password = registry.password.clone().ok_or_else(|| {
            ServerError::bad_request("Registry password must be provided")
        })?;
        let row = NewContainerRegistry {
            project_id: project.to_string(),
            url: registry.url.clone(),
            username: registry.username.clone(),
            password,
        };
        let id = self
            .storage
            .execute_in_transaction(|tx| async move {
                let id = tx.container_registries().create_new(&row).await?;
                self.apply_registries_secret(&tx, project).await?;
                Ok::<_, ServerError>(id)
            })
            .await?;
        registry.id = Some(id);
        registry.password = None;
        info!(project, registry = %registry.url, "container registry added");
        Ok(registry)
    }

    async fn delete_container_registry(
        &self,
        project: &str,
        id: i32,
        auth: &Authentication,
    ) -> ServerResult<()> {
        self.projects.check_access(project, auth).await?;
        self.storage
            .execute_in_transaction(|tx| async move {
                match tx
                    .container_registries()
                    .delete_by_id_and_project(id, project)
                    .await
                {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => return Ok(()),
                    Err(err) => return Err(err.into()),
                }
                self.apply_registries_secret(&tx, project).await?;
                Ok::<_, ServerError>(())
            })
            .await?;
        info!(project, registry_id = id, "container registry deleted");
        Ok(())
    }

    async fn sync_kubernetes(&self, project_id: &str) -> ServerResult<()> {
        self.apply_registries_secret(&self.storage, project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_all_registries_into_auths() {
        let registries = vec![
            ("reg1".to_string(), "u1".to_string(), "p1".to_string()),
            ("reg2".to_string(), "u2".to_string(), "p2".to_string()),
        ];
        let body = dockerconfig_json(&registries).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["auths"]["reg1"]["auth"], "dTE6cDE=");
        assert_eq!(parsed["auths"]["reg2"]["auth"], "dTI6cDI=");
    }

    #[test]
    fn empty_registry_set_serializes_to_empty_auths() {
        let body = dockerconfig_json(&[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["auths"], serde_json::json!({}));
    }

    #[test]
    fn url_validation_accepts_schemeless_hosts() {
        assert!(is_registry_url_valid("registry.example.com"));
        assert!(is_registry_url_valid("https://registry.example.com"));
        assert!(is_registry_url_valid("localhost:5000"));
        assert!(!is_registry_url_valid("http://"));
    }
}
