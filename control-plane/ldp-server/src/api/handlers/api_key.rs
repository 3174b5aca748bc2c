use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::ApiKey;

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_api_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
) -> ServerResult<Json<Vec<ApiKey>>> {
    Ok(Json(state.core.api_keys.get_api_keys(&auth).await?))
}

pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Json(key): Json<ApiKey>,
) -> ServerResult<(StatusCode, Json<ApiKey>)> {
    let created = state.core.api_keys.create_api_key(key, &auth).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(key): Path<String>,
) -> ServerResult<StatusCode> {
    state.core.api_keys.delete_api_key(&key, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}
