use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::ContainerRegistry;

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_registries(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(project): Path<String>,
) -> ServerResult<Json<Vec<ContainerRegistry>>> {
    Ok(Json(
        state
            .core
            .registries
            .get_project_container_registries(&project, &auth)
            .await?,
    ))
}

pub async fn add_registry(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(project): Path<String>,
    Json(registry): Json<ContainerRegistry>,
) -> ServerResult<(StatusCode, Json<ContainerRegistry>)> {
    let created = state
        .core
        .registries
        .add_container_registry(&project, registry, &auth)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_registry(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((project, registry_id)): Path<(String, i32)>,
) -> ServerResult<StatusCode> {
    state
        .core
        .registries
        .delete_container_registry(&project, registry_id, &auth)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
