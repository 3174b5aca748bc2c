//! Typed repositories over the PostgreSQL store.
//!
//! The [`Storage`] handle is cheap to clone and is either bound to the
//! connection pool or to an open transaction. Repository methods behave
//! identically in both modes, so domain code can run the same path inside
//! or outside [`Storage::execute_in_transaction`].

pub mod api_key;
pub mod entities;
pub mod error;
mod handle;
pub mod managed_service;
pub mod project;
pub mod registry;
pub mod secret;
pub mod service;

pub use entities::{
    ApiKeyEntity, ContainerRegistryEntity, EnvVarRecord, ManagedServiceEntity,
    NewManagedService, NewService, ProjectEntity, SecretEntity, ServiceEntity,
};
pub use error::{StorageError, StorageResult};
pub use handle::{DbConfig, Storage, connect};

/// JSON column wrapper, re-exported so callers building entities do not
/// need a direct sqlx dependency.
pub use sqlx::types::Json;
