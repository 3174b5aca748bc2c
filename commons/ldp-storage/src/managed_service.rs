use crate::entities::{ManagedServiceEntity, NewManagedService};
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

pub struct ManagedServiceRepository<'a> {
    storage: &'a Storage,
}

impl<'a> ManagedServiceRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        ManagedServiceRepository { storage }
    }

    pub async fn create_new(
        &self,
        entity: &NewManagedService,
    ) -> StorageResult<i32> {
        let entity = entity.clone();
        let id = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i32>(
                        "INSERT INTO managed_service (project_id, name, type) \
                         VALUES ($1, $2, $3) RETURNING id",
                    )
                    .bind(entity.project_id)
                    .bind(entity.name)
                    .bind(entity.service_type)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(id)
    }

    pub async fn find_by_id(
        &self,
        id: i32,
    ) -> StorageResult<ManagedServiceEntity> {
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ManagedServiceEntity>(
                        "SELECT id, project_id, name, type \
                         FROM managed_service WHERE id = $1",
                    )
                    .bind(id)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| {
            StorageError::NotFound(format!("managed service {id}"))
        })
    }

    pub async fn find_by_project_id(
        &self,
        project_id: &str,
    ) -> StorageResult<Vec<ManagedServiceEntity>> {
        let project_id = project_id.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ManagedServiceEntity>(
                        "SELECT id, project_id, name, type \
                         FROM managed_service \
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
                        "SELECT exists(SELECT 1 FROM managed_service \
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

    pub async fn delete(&self, id: i32) -> StorageResult<()> {
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM managed_service WHERE id = $1")
                        .bind(id)
                        .execute(conn)
                        .await
                })
            })
            .await?;
        Ok(())
    }
}
