use crate::entities::ContainerRegistryEntity;
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

/// Insert payload for a registry credential row.
#[derive(Debug, Clone)]
pub struct NewContainerRegistry {
    pub project_id: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

pub struct ContainerRegistryRepository<'a> {
    storage: &'a Storage,
}

impl<'a> ContainerRegistryRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        ContainerRegistryRepository { storage }
    }

    pub async fn find_by_project_id(
        &self,
        project_id: &str,
    ) -> StorageResult<Vec<ContainerRegistryEntity>> {
        let project_id = project_id.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ContainerRegistryEntity>(
                        "SELECT id, project_id, url, username, password \
                         FROM container_registry \
                         WHERE project_id = $1 ORDER BY id",
                    )
                    .bind(project_id)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    pub async fn create_new(
        &self,
        registry: &NewContainerRegistry,
    ) -> StorageResult<i32> {
        let registry = registry.clone();
        let id = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i32>(
                        "INSERT INTO container_registry \
                         (project_id, url, username, password) \
                         VALUES ($1, $2, $3, $4) RETURNING id",
                    )
                    .bind(registry.project_id)
                    .bind(registry.url)
                    .bind(registry.username)
                    .bind(registry.password)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(id)
    }

    /// Delete is scoped to the project so that a registry id from another
    /// tenant cannot be removed through a foreign project path.
    pub async fn delete_by_id_and_project(
        &self,
        id: i32,
        project_id: &str,
    ) -> StorageResult<()> {
        let project_id = project_id.to_string();
        let result = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "DELETE FROM container_registry \
                         WHERE id = $1 AND project_id = $2",
                    )
                    .bind(id)
                    .bind(project_id)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "container registry {id}"
            )));
        }
        Ok(())
    }
}
