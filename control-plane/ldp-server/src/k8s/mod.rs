//! Cluster access: shared client, label vocabulary, and the server-side
//! apply / idempotent delete primitives every controller goes through.

pub mod resources;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

/// Field manager for every server-side apply issued by this process.
pub const FIELD_MANAGER: &str = "letsdeploy";

/// Objects carrying this label are owned by the reconciler and may be
/// deleted by it; nothing else ever is.
pub const MANAGED_LABEL: &str = "letsdeploy.space/managed";
pub const SERVICE_TYPE_LABEL: &str = "letsdeploy.space/service-type";
pub const NAMESPACE_LABEL: &str = "letsdeploy.space/project-namespace";
pub const APP_LABEL: &str = "app";

pub const SERVICE_TYPE_SERVICE: &str = "service";
pub const SERVICE_TYPE_MANAGED: &str = "managed";

/// The single container of every workload pod.
pub const CONTAINER_NAME: &str = "container-0";
/// The single data key of every mirrored secret.
pub const SECRET_KEY: &str = "value";
/// Aggregated registry credentials; unlabelled on purpose so the
/// reconciler's delete-unknown phase never collects it.
pub const REGCRED_SECRET_NAME: &str = "regcred";

#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    pub in_cluster: bool,
    pub master_url: Option<String>,
}

/// Cheap-to-clone handle around the shared [`kube::Client`].
#[derive(Clone)]
pub struct Kube {
    client: Client,
}

impl Kube {
    pub async fn connect(cfg: &KubernetesConfig) -> anyhow::Result<Self> {
        let config = if cfg.in_cluster {
            Config::incluster()?
        } else if let Some(url) = &cfg.master_url {
            Config::new(url.parse::<http::Uri>()?)
        } else {
            Config::infer().await?
        };
        let client = Client::try_from(config)?;
        info!(in_cluster = cfg.in_cluster, "kubernetes client ready");
        Ok(Kube { client })
    }

    pub fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    pub fn deployments(&self, ns: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn stateful_sets(&self, ns: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn services(&self, ns: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn secrets(&self, ns: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn ingresses(&self, ns: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), ns)
    }

    /// cert-manager Certificates are applied dynamically; this controller
    /// owns no CRDs of its own.
    pub fn certificates(&self, ns: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("cert-manager.io", "v1", "Certificate");
        let ar = ApiResource::from_gvk(&gvk);
        Api::namespaced_with(self.client.clone(), ns, &ar)
    }

    /// Server-side apply under the shared field manager; idempotent, so
    /// mutation paths and the reconciler converge on the same state.
    pub async fn apply<K>(
        &self,
        api: &Api<K>,
        name: &str,
        resource: &K,
    ) -> Result<K, kube::Error>
    where
        K: Clone + std::fmt::Debug + Serialize + DeserializeOwned,
    {
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &pp, &Patch::Apply(resource)).await
    }

    pub async fn apply_dynamic(
        &self,
        api: &Api<DynamicObject>,
        name: &str,
        manifest: &serde_json::Value,
    ) -> Result<DynamicObject, kube::Error> {
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &pp, &Patch::Apply(manifest)).await
    }

    pub async fn delete_ignore_not_found<K>(
        &self,
        api: &Api<K>,
        name: &str,
    ) -> Result<(), kube::Error>
    where
        K: Clone + std::fmt::Debug + DeserializeOwned,
    {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Label selector matching everything this controller owns for a given
/// sub-kind.
pub fn managed_selector(service_type: Option<&str>) -> String {
    match service_type {
        Some(kind) => {
            format!("{MANAGED_LABEL}=true,{SERVICE_TYPE_LABEL}={kind}")
        }
        None => format!("{MANAGED_LABEL}=true"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_selector_scopes_by_sub_kind() {
        assert_eq!(
            managed_selector(None),
            "letsdeploy.space/managed=true"
        );
        assert_eq!(
            managed_selector(Some(SERVICE_TYPE_MANAGED)),
            "letsdeploy.space/managed=true,letsdeploy.space/service-type=managed"
        );
    }
}
