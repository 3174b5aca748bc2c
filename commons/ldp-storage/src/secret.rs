use crate::entities::SecretEntity;
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

/// Insert payload for a secret row.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub project_id: String,
    pub name: String,
    pub value: String,
    pub managed_service_id: Option<i32>,
}

pub struct SecretRepository<'a> {
    storage: &'a Storage,
}

impl<'a> SecretRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        SecretRepository { storage }
    }

    pub async fn find_by_project_id(
        &self,
        project_id: &str,
    ) -> StorageResult<Vec<SecretEntity>> {
        let project_id = project_id.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, SecretEntity>(
                        "SELECT id, project_id, name, value, managed_service_id \
                         FROM secret WHERE project_id = $1 ORDER BY name",
                    )
                    .bind(project_id)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    pub async fn create_new(&self, secret: &NewSecret) -> StorageResult<i32> {
        let secret = secret.clone();
        let id = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i32>(
                        "INSERT INTO secret \
                         (project_id, name, value, managed_service_id) \
                         VALUES ($1, $2, $3, $4) RETURNING id",
                    )
                    .bind(secret.project_id)
                    .bind(secret.name)
                    .bind(secret.value)
                    .bind(secret.managed_service_id)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(id)
    }

    pub async fn exists_by_project_id_and_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> StorageResult<bool> {
        let project_id = project_id.to_string();
        let name = name.to_string();
        let exists = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, bool>(
                        "SELECT exists(SELECT 1 FROM secret \
                         WHERE project_id = $1 AND name = $2)",
                    )
                    .bind(project_id)
                    .bind(name)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(exists)
    }

    pub async fn find_by_project_id_and_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> StorageResult<SecretEntity> {
        let project_owned = project_id.to_string();
        let name_owned = name.to_string();
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, SecretEntity>(
                        "SELECT id, project_id, name, value, managed_service_id \
                         FROM secret WHERE project_id = $1 AND name = $2",
                    )
                    .bind(project_owned)
                    .bind(name_owned)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| {
            StorageError::NotFound(format!("secret {name} in project {project_id}"))
        })
    }

    pub async fn delete_by_project_id_and_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> StorageResult<()> {
        let project_id = project_id.to_string();
        let name = name.to_string();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "DELETE FROM secret \
                         WHERE project_id = $1 AND name = $2",
                    )
                    .bind(project_id)
                    .bind(name)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }
}
