use crate::entities::ApiKeyEntity;
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

pub struct ApiKeyRepository<'a> {
    storage: &'a Storage,
}

impl<'a> ApiKeyRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        ApiKeyRepository { storage }
    }

    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> StorageResult<Vec<ApiKeyEntity>> {
        let username = username.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ApiKeyEntity>(
                        "SELECT id, username, name FROM api_key \
                         WHERE username = $1 ORDER BY name",
                    )
                    .bind(username)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    /// The key string is the primary key; comparison is plain equality.
    pub async fn find_by_id(&self, key: &str) -> StorageResult<ApiKeyEntity> {
        let key_owned = key.to_string();
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ApiKeyEntity>(
                        "SELECT id, username, name FROM api_key WHERE id = $1",
                    )
                    .bind(key_owned)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| StorageError::NotFound("API key".to_string()))
    }

    pub async fn create_new(&self, entity: &ApiKeyEntity) -> StorageResult<()> {
        let entity = entity.clone();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO api_key (id, username, name) \
                         VALUES ($1, $2, $3)",
                    )
                    .bind(entity.id)
                    .bind(entity.username)
                    .bind(entity.name)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM api_key WHERE id = $1")
                        .bind(key)
                        .execute(conn)
                        .await
                })
            })
            .await?;
        Ok(())
    }
}
