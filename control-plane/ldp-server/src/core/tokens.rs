use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::core::Authentication;
use crate::errors::{ServerError, ServerResult};
use crate::util::random::generate_temp_token;

/// Tokens live just long enough for a browser to open the websocket.
const TOKEN_TTL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Tokens: Send + Sync {
    async fn create_temp_token(
        &self,
        auth: &Authentication,
    ) -> ServerResult<String>;
    /// Delete-on-read: a token authenticates exactly one handshake.
    async fn consume_temp_token(
        &self,
        token: &str,
    ) -> ServerResult<Option<String>>;
}

pub struct TokensImpl {
    redis: ConnectionManager,
}

pub fn init_tokens(redis: ConnectionManager) -> Arc<TokensImpl> {
    Arc::new(TokensImpl { redis })
}

#[async_trait]
impl Tokens for TokensImpl {
    async fn create_temp_token(
        &self,
        auth: &Authentication,
    ) -> ServerResult<String> {
        let token = generate_temp_token();
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(
            &token,
            &auth.username,
            TOKEN_TTL.as_secs(),
        )
        .await
        .map_err(|err| {
            ServerError::internal_wrap(err, "failed to save token to Redis")
        })?;
        debug!(username = %auth.username, "temp token issued");
        Ok(token)
    }

    async fn consume_temp_token(
        &self,
        token: &str,
    ) -> ServerResult<Option<String>> {
        let mut conn = self.redis.clone();
        let username: Option<String> = conn.get_del(token).await?;
        Ok(username)
    }
}
