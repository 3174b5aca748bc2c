//! Coded errors shared by every domain component.
//!
//! A [`ServerError`] carries an HTTP-shaped code, a message, and an
//! optional cause chain. Uncoded errors entering through the `From`
//! impls become 500s; [`find_coded`] recovers the first coded error in a
//! foreign chain so middleware can render it.

use std::error::Error as StdError;
use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

pub type ServerResult<T> = Result<T, ServerError>;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug)]
pub struct ServerError {
    pub code: u16,
    pub message: String,
    cause: Option<Cause>,
}

impl ServerError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        ServerError {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn wrap(
        cause: impl Into<Cause>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        ServerError {
            code,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    pub fn internal_wrap(
        cause: impl Into<Cause>,
        message: impl Into<String>,
    ) -> Self {
        Self::wrap(cause, 500, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ServerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }
}

/// Walk a foreign error chain and return the first coded error in it.
pub fn find_coded<'a>(
    err: &'a (dyn StdError + 'static),
) -> Option<&'a ServerError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(coded) = e.downcast_ref::<ServerError>() {
            return Some(coded);
        }
        current = e.source();
    }
    None
}

impl From<ldp_storage::StorageError> for ServerError {
    fn from(err: ldp_storage::StorageError) -> Self {
        if err.is_not_found() {
            let message = err.to_string();
            ServerError::wrap(err, 404, message)
        } else {
            ServerError::internal_wrap(err, "database operation failed")
        }
    }
}

impl From<kube::Error> for ServerError {
    fn from(err: kube::Error) -> Self {
        ServerError::internal_wrap(err, "Kubernetes API call failed")
    }
}

impl From<redis::RedisError> for ServerError {
    fn from(err: redis::RedisError) -> Self {
        ServerError::internal_wrap(err, "Redis call failed")
    }
}

impl From<mongodb::error::Error> for ServerError {
    fn from(err: mongodb::error::Error) -> Self {
        ServerError::internal_wrap(err, "MongoDB call failed")
    }
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err.to_string();
        ServerError::wrap(err, 400, message)
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::internal_wrap(err, "serialization failed")
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            // The chain is logged here and never exposed to clients.
            error!(code = self.code, error = ?self, "request failed");
        }
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.message
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer wrapper: {source}")]
    struct Outer {
        #[source]
        source: ServerError,
    }

    #[test]
    fn finds_first_coded_error_in_chain() {
        let outer = Outer {
            source: ServerError::not_found("project proj-a"),
        };
        let coded = find_coded(&outer).expect("coded error in chain");
        assert_eq!(coded.code, 404);
        assert_eq!(coded.message, "project proj-a");
    }

    #[test]
    fn uncoded_chains_yield_none() {
        let plain = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(find_coded(&plain).is_none());
    }

    #[test]
    fn storage_not_found_maps_to_404() {
        let err: ServerError =
            ldp_storage::StorageError::NotFound("service 7".into()).into();
        assert_eq!(err.code, 404);
        assert!(err.is_not_found());
    }

    #[test]
    fn cause_chain_is_preserved() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "io");
        let wrapped = ServerError::internal_wrap(inner, "outer");
        assert!(wrapped.source().is_some());
    }
}
