use crate::entities::ProjectEntity;
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

pub struct ProjectRepository<'a> {
    storage: &'a Storage,
}

impl<'a> ProjectRepository<'a> {
    pub(crate) fn new(storage: &'a Storage) -> Self {
        ProjectRepository { storage }
    }

    pub async fn find_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ProjectEntity>> {
        let rows = self
            .storage
            .with_conn(|conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ProjectEntity>(
                        "SELECT id, invite_code FROM project \
                         ORDER BY id LIMIT $1 OFFSET $2",
                    )
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    pub async fn exists_by_id(&self, id: &str) -> StorageResult<bool> {
        let id = id.to_string();
        let exists = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, bool>(
                        "SELECT exists(SELECT 1 FROM project WHERE id = $1)",
                    )
                    .bind(id)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(exists)
    }

    pub async fn find_by_id(&self, id: &str) -> StorageResult<ProjectEntity> {
        let key = id.to_string();
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ProjectEntity>(
                        "SELECT id, invite_code FROM project WHERE id = $1",
                    )
                    .bind(key)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| StorageError::NotFound(format!("project {id}")))
    }

    pub async fn find_by_invite_code(
        &self,
        code: &str,
    ) -> StorageResult<ProjectEntity> {
        let code_owned = code.to_string();
        let row = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ProjectEntity>(
                        "SELECT id, invite_code FROM project \
                         WHERE invite_code = $1",
                    )
                    .bind(code_owned)
                    .fetch_optional(conn)
                    .await
                })
            })
            .await?;
        row.ok_or_else(|| {
            StorageError::NotFound("project with this invite code".to_string())
        })
    }

    pub async fn create_new(&self, entity: &ProjectEntity) -> StorageResult<()> {
        let entity = entity.clone();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO project (id, invite_code) VALUES ($1, $2)",
                    )
                    .bind(entity.id)
                    .bind(entity.invite_code)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn update(&self, entity: &ProjectEntity) -> StorageResult<()> {
        let entity = entity.clone();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE project SET invite_code = $2 WHERE id = $1",
                    )
                    .bind(entity.id)
                    .bind(entity.invite_code)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let id = id.to_string();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM project WHERE id = $1")
                        .bind(id)
                        .execute(conn)
                        .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn find_user_projects(
        &self,
        username: &str,
    ) -> StorageResult<Vec<ProjectEntity>> {
        let username = username.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, ProjectEntity>(
                        "SELECT p.id, p.invite_code FROM project p \
                         JOIN project_participant pp ON p.id = pp.project_id \
                         WHERE pp.username = $1 ORDER BY p.id",
                    )
                    .bind(username)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    pub async fn get_participants(
        &self,
        id: &str,
    ) -> StorageResult<Vec<String>> {
        let id = id.to_string();
        let rows = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, String>(
                        "SELECT username FROM project_participant \
                         WHERE project_id = $1 ORDER BY username",
                    )
                    .bind(id)
                    .fetch_all(conn)
                    .await
                })
            })
            .await?;
        Ok(rows)
    }

    pub async fn add_participant(
        &self,
        id: &str,
        username: &str,
    ) -> StorageResult<()> {
        let id = id.to_string();
        let username = username.to_string();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO project_participant (project_id, username) \
                         VALUES ($1, $2) ON CONFLICT DO NOTHING",
                    )
                    .bind(id)
                    .bind(username)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn remove_participant(
        &self,
        id: &str,
        username: &str,
    ) -> StorageResult<()> {
        let id = id.to_string();
        let username = username.to_string();
        self.storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "DELETE FROM project_participant \
                         WHERE project_id = $1 AND username = $2",
                    )
                    .bind(id)
                    .bind(username)
                    .execute(conn)
                    .await
                })
            })
            .await?;
        Ok(())
    }

    pub async fn is_participant(
        &self,
        id: &str,
        username: &str,
    ) -> StorageResult<bool> {
        let id = id.to_string();
        let username = username.to_string();
        let exists = self
            .storage
            .with_conn(move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, bool>(
                        "SELECT exists(SELECT 1 FROM project_participant \
                         WHERE project_id = $1 AND username = $2)",
                    )
                    .bind(id)
                    .bind(username)
                    .fetch_one(conn)
                    .await
                })
            })
            .await?;
        Ok(exists)
    }
}
