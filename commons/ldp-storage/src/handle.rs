use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api_key::ApiKeyRepository;
use crate::error::{StorageError, StorageResult};
use crate::managed_service::ManagedServiceRepository;
use crate::project::ProjectRepository;
use crate::registry::ContainerRegistryRepository;
use crate::secret::SecretRepository;
use crate::service::ServiceRepository;

/// The pool stays bounded; transactions are scoped per mutation.
const MAX_CONNECTIONS: u32 = 20;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

pub async fn connect(cfg: &DbConfig) -> StorageResult<PgPool> {
    let url = format!(
        "postgres://{}:{}@{}/{}",
        cfg.username, cfg.password, cfg.host, cfg.database
    );
    info!(host = %cfg.host, database = %cfg.database, "connecting to postgres");
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(&url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Storage handle shared by every domain component.
///
/// A handle is either pool-bound or transaction-bound. The transaction is
/// behind a shared slot so that nested `execute_in_transaction` calls join
/// the outer transaction and only the outermost frame commits.
#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
    tx: Option<SharedTx>,
}

impl Storage {
    pub fn new(pool: PgPool) -> Self {
        Storage { pool, tx: None }
    }

    pub fn projects(&self) -> ProjectRepository<'_> {
        ProjectRepository::new(self)
    }

    pub fn services(&self) -> ServiceRepository<'_> {
        ServiceRepository::new(self)
    }

    pub fn managed_services(&self) -> ManagedServiceRepository<'_> {
        ManagedServiceRepository::new(self)
    }

    pub fn secrets(&self) -> SecretRepository<'_> {
        SecretRepository::new(self)
    }

    pub fn container_registries(&self) -> ContainerRegistryRepository<'_> {
        ContainerRegistryRepository::new(self)
    }

    pub fn api_keys(&self) -> ApiKeyRepository<'_> {
        ApiKeyRepository::new(self)
    }

    /// Run `op` inside a database transaction.
    ///
    /// A pool-bound handle opens a transaction, passes a transaction-bound
    /// handle to `op`, and commits on success / rolls back on error. A
    /// handle that is already transactional joins the existing transaction
    /// and leaves commit/rollback to the outermost caller.
    pub async fn execute_in_transaction<F, Fut, T, E>(
        &self,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Storage) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        if self.tx.is_some() {
            return op(self.clone()).await;
        }

        let tx = self.pool.begin().await.map_err(StorageError::from)?;
        let slot: SharedTx = Arc::new(Mutex::new(Some(tx)));
        let scoped = Storage {
            pool: self.pool.clone(),
            tx: Some(Arc::clone(&slot)),
        };

        match op(scoped).await {
            Ok(value) => {
                if let Some(tx) = slot.lock().await.take() {
                    tx.commit().await.map_err(StorageError::from)?;
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(tx) = slot.lock().await.take() {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "transaction rollback failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Run a query closure against the right connection: the open
    /// transaction when this handle is transactional, a pooled connection
    /// otherwise.
    pub(crate) async fn with_conn<T, F>(&self, op: F) -> Result<T, sqlx::Error>
    where
        F: for<'c> FnOnce(
            &'c mut PgConnection,
        ) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        match &self.tx {
            Some(slot) => {
                let mut guard = slot.lock().await;
                match guard.as_mut() {
                    Some(tx) => op(&mut **tx).await,
                    // The outer frame already committed or rolled back.
                    None => Err(sqlx::Error::PoolClosed),
                }
            }
            None => {
                let mut conn = self.pool.acquire().await?;
                op(&mut conn).await
            }
        }
    }
}
