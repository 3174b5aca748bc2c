use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::{ManagedService, ServiceStatus};

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_project_managed_services(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(project): Path<String>,
) -> ServerResult<Json<Vec<ManagedService>>> {
    Ok(Json(
        state
            .core
            .managed_services
            .get_project_managed_services(&project, &auth)
            .await?,
    ))
}

pub async fn create_managed_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Json(service): Json<ManagedService>,
) -> ServerResult<(StatusCode, Json<ManagedService>)> {
    let created = state
        .core
        .managed_services
        .create_managed_service(service, &auth)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_managed_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<ManagedService>> {
    Ok(Json(
        state
            .core
            .managed_services
            .get_managed_service(id, &auth)
            .await?,
    ))
}

pub async fn delete_managed_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<StatusCode> {
    state
        .core
        .managed_services
        .delete_managed_service(id, &auth)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_managed_service_status(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<ServiceStatus>> {
    Ok(Json(
        state
            .core
            .managed_services
            .get_managed_service_status(id, &auth)
            .await?,
    ))
}
