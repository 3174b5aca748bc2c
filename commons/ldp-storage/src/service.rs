use sqlx::types::Json;

use crate::entities::{NewService, ServiceEntity};
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

const COLUMNS: &str =
    "id, project_id, name, image, port, public_api_prefix, env_vars, replicas";

pub struct ServiceRepository<'a> {
    storage: &'a Storage,
}

impl<'a> ServiceRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        ServiceRepository { storage }
    }

    pub async fn create_new(&self, service: &NewService) -> StorageResult<i32> {
        let service = service.clone();
        let id = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i32>(
                        "INSERT INTO service \
                         (project_id, name, image, port, public_api_prefix, env_vars, replicas) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                    )
                    .bind(service.project_id)
                    .bind(service.name)
                    .bind(service.image)
                    .bind(service.port)
                    .bind(service.public_api_prefix)
                    .bind(Json(service.env_vars))
                    .bind(service.replicas)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(id)
    }

    pub async fn find_by_id(&self, id: i32) -> StorageResult<ServiceEntity> {
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ServiceEntity>(&format!(
                        "SELECT {COLUMNS} FROM service WHERE id = $1"
                    ))
                    .bind(id)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| StorageError::NotFound(format!("service {id}")))
    }

    pub async fn find_by_project_id(
        &self,
        project_id: &str,
    ) -> StorageResult<Vec<ServiceEntity>> {
        let project_id = project_id.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ServiceEntity>(&format!(
                        "SELECT {COLUMNS} FROM service \
                         WHERE project_id = $1 ORDER BY id"
                    ))
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
                        "SELECT exists(SELECT 1 FROM service \
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

    /// Project and name are immutable; only the mutable columns change.
    pub async fn update(&self, entity: &ServiceEntity) -> StorageResult<()> {
        let entity = entity.clone();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE service SET image = $2, port = $3, \
                         public_api_prefix = $4, env_vars = $5, replicas = $6 \
                         WHERE id = $1",
                    )
                    .bind(entity.id)
                    .bind(entity.image)
                    .bind(entity.port)
                    .bind(entity.public_api_prefix)
                    .bind(entity.env_vars)
                    .bind(entity.replicas)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> StorageResult<()> {
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM service WHERE id = $1")
                        .bind(id)
                        .execute(conn)
                        .await
                })
            })
            .await?;
        Ok(())
    }
}
