use std::sync::Arc;

use async_trait::async_trait;
use ldp_models::ApiKey;
use ldp_storage::{ApiKeyEntity, Storage};
use tracing::info;
use validator::Validate;

use crate::core::Authentication;
use crate::errors::{ServerError, ServerResult};
use crate::util::random::generate_api_key;

#[async_trait]
pub trait ApiKeys: Send + Sync {
    async fn get_api_keys(
        &self,
        auth: &Authentication,
    ) -> ServerResult<Vec<ApiKey>>;
    /// Resolves an opaque key to its owner at authentication time; the
    /// key string is the credential and is compared as-is.
    async fn get_username_by_api_key(&self, key: &str)
    -> ServerResult<String>;
    async fn create_api_key(
        &self,
        key: ApiKey,
        auth: &Authentication,
    ) -> ServerResult<ApiKey>;
    async fn delete_api_key(
        &self,
        key: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
}

pub struct ApiKeysImpl {
    storage: Storage,
}

pub fn init_api_keys(storage: Storage) -> Arc<ApiKeysImpl> {
    Arc::new(ApiKeysImpl { storage })
}

#[async_trait]
impl ApiKeys for ApiKeysImpl {
    async fn get_api_keys(
        &self,
        auth: &Authentication,
    ) -> ServerResult<Vec<ApiKey>> {
        let entities = self
            .storage
            .api_keys()
            .get_by_username(&auth.username)
            .await?;
        Ok(entities
            .into_iter()
            .map(|e| ApiKey {
                key: Some(e.id),
                name: e.name,
            })
            .collect())
    }

    async fn get_username_by_api_key(
        &self,
        key: &str,
    ) -> ServerResult<String> {
        let entity = self.storage.api_keys().find_by_id(key).await?;
        Ok(entity.username)
    }

    async fn create_api_key(
        &self,
        mut key: ApiKey,
        auth: &Authentication,
    ) -> ServerResult<ApiKey> {
        key.validate()?;
        let id = generate_api_key();
        let entity = ApiKeyEntity {
            id: id.clone(),
            username: auth.username.clone(),
            name: key.name.clone(),
        };
        self.storage.api_keys().create_new(&entity).await?;
        key.key = Some(id);
        info!(username = %auth.username, "API key created");
        Ok(key)
    }

    async fn delete_api_key(
        &self,
        key: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let entity = match self.storage.api_keys().find_by_id(key).await {
            Ok(entity) => entity,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        // Foreign keys read as absent, not forbidden.
        if entity.username != auth.username {
            return Err(ServerError::not_found("API key not found"));
        }
        self.storage.api_keys().delete(key).await?;
        info!(username = %auth.username, "API key deleted");
        Ok(())
    }
}
