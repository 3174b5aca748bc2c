use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

use crate::api::middleware::AuthVerifier;
use crate::api::ApiServer;
use crate::config::AppConfig;
use crate::core::managed::init_managed_services;
use crate::core::mongo::init_mongodb_mgmt;
use crate::core::projects::{ProjectsConfig, init_projects};
use crate::core::registries::init_container_registries;
use crate::core::services::init_services;
use crate::core::api_keys::init_api_keys;
use crate::core::tokens::init_tokens;
use crate::core::{
    ApiKeys, ContainerRegistries, Core, ManagedServices, MongoDbMgmt,
    Projects, Services, Tokens,
};
use crate::k8s::{Kube, KubernetesConfig};
use crate::util::promise::Promise;

/// Wire the whole application from configuration: storage (running
/// migrations), the cluster client, Redis, the controller aggregate, and
/// the HTTP server.
pub async fn build_application(
    config: &AppConfig,
) -> Result<(ApiServer, Core)> {
    let pool = ldp_storage::connect(&config.db())
        .await
        .context("failed to connect to postgres")?;
    let storage = ldp_storage::Storage::new(pool);

    let kube = Kube::connect(&KubernetesConfig {
        in_cluster: config.kubernetes_in_cluster,
        master_url: config.kubernetes_master_url.clone(),
    })
    .await
    .context("failed to build kubernetes client")?;

    let redis_client =
        redis::Client::open(format!("redis://{}", config.redis_host))
            .context("invalid redis host")?;
    let redis = ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let auth = Arc::new(
        AuthVerifier::from_oidc_provider(
            &config.oidc_provider,
            &config.oidc_username_claim,
        )
        .await
        .context("failed to load OIDC signing keys")?,
    );

    let core = build_core(config, storage, kube, redis);
    let server = ApiServer::new(core.clone(), auth, config.server_port);
    Ok((server, core))
}

/// Construct and wire the controller aggregate. Projects subscribes to
/// the promise so it can reach Services/ManagedServices once the whole
/// aggregate exists, without a constructor cycle.
pub fn build_core(
    config: &AppConfig,
    storage: ldp_storage::Storage,
    kube: Kube,
    redis: ConnectionManager,
) -> Core {
    let core_promise: Promise<Core> = Promise::new();

    let projects: Arc<dyn Projects> = init_projects(
        storage.clone(),
        kube.clone(),
        ProjectsConfig {
            domain: config.domain.clone(),
            tls_enabled: config.tls_enabled,
            tls_cluster_issuer: config.tls_cluster_issuer.clone(),
        },
        &core_promise,
    );
    let services: Arc<dyn Services> = init_services(
        Arc::clone(&projects),
        storage.clone(),
        kube.clone(),
        config.domain.clone(),
        config.tls_enabled,
    );
    let managed_services: Arc<dyn ManagedServices> = init_managed_services(
        Arc::clone(&projects),
        storage.clone(),
        kube.clone(),
    );
    let registries: Arc<dyn ContainerRegistries> = init_container_registries(
        Arc::clone(&projects),
        storage.clone(),
        kube,
    );
    let mongodb: Arc<dyn MongoDbMgmt> =
        init_mongodb_mgmt(Arc::clone(&managed_services), storage.clone());
    let api_keys: Arc<dyn ApiKeys> = init_api_keys(storage);
    let tokens: Arc<dyn Tokens> = init_tokens(redis);

    let core = Core {
        projects,
        services,
        managed_services,
        registries,
        mongodb,
        api_keys,
        tokens,
    };
    core_promise.resolve(core.clone());
    core
}
