//! Domain controllers. Every mutation persists to the relational store
//! and projects the change into the cluster inside the same transaction
//! scope; the reconciler re-runs the same projection paths periodically.

pub mod api_keys;
pub mod managed;
pub mod mongo;
pub mod projects;
pub mod registries;
pub mod services;
pub mod status;
pub mod sync;
pub mod tokens;

use std::pin::Pin;
use std::sync::Arc;

pub use api_keys::ApiKeys;
pub use managed::ManagedServices;
pub use mongo::MongoDbMgmt;
pub use projects::Projects;
pub use registries::ContainerRegistries;
pub use services::Services;
pub use tokens::Tokens;

pub const SERVICE_ACCOUNT_USERNAME: &str = "letsdeploy-service-account";

/// Identity attached to every request. The service account is internal
/// only; it bypasses membership checks so the reconciler can reuse the
/// user-facing code paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub username: String,
    service_account: bool,
}

impl Authentication {
    pub fn user(username: impl Into<String>) -> Self {
        Authentication {
            username: username.into(),
            service_account: false,
        }
    }

    pub fn service_account() -> Self {
        Authentication {
            username: SERVICE_ACCOUNT_USERNAME.to_string(),
            service_account: true,
        }
    }

    pub fn is_service_account(&self) -> bool {
        self.service_account
    }
}

/// Follow-mode reader over one pod's log output.
pub type LogStream = Pin<Box<dyn futures::AsyncBufRead + Send>>;

/// The wired controller aggregate handed to the HTTP layer and the
/// reconciler.
#[derive(Clone)]
pub struct Core {
    pub projects: Arc<dyn Projects>,
    pub services: Arc<dyn Services>,
    pub managed_services: Arc<dyn ManagedServices>,
    pub registries: Arc<dyn ContainerRegistries>,
    pub mongodb: Arc<dyn MongoDbMgmt>,
    pub api_keys: Arc<dyn ApiKeys>,
    pub tokens: Arc<dyn Tokens>,
}
