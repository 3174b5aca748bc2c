use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::{EnvVar, Service, ServiceStatus};

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_project_services(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(project): Path<String>,
) -> ServerResult<Json<Vec<Service>>> {
    Ok(Json(
        state
            .core
            .services
            .get_project_services(&project, &auth)
            .await?,
    ))
}

pub async fn create_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Json(service): Json<Service>,
) -> ServerResult<(StatusCode, Json<Service>)> {
    let created = state.core.services.create_service(service, &auth).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<Service>> {
    Ok(Json(state.core.services.get_service(id, &auth).await?))
}

pub async fn update_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
    Json(mut service): Json<Service>,
) -> ServerResult<Json<Service>> {
    service.id = Some(id);
    Ok(Json(state.core.services.update_service(service, &auth).await?))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<StatusCode> {
    state.core.services.delete_service(id, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_service_status(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<ServiceStatus>> {
    Ok(Json(state.core.services.get_service_status(id, &auth).await?))
}

pub async fn restart_service(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<StatusCode> {
    state.core.services.restart_service(id, &auth).await?;
    Ok(StatusCode::OK)
}

pub async fn get_env_vars(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<Vec<EnvVar>>> {
    Ok(Json(state.core.services.get_service_env_vars(id, &auth).await?))
}

pub async fn set_env_var(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
    Json(env_var): Json<EnvVar>,
) -> ServerResult<Json<EnvVar>> {
    Ok(Json(
        state
            .core
            .services
            .set_service_env_var(id, env_var, &auth)
            .await?,
    ))
}

pub async fn delete_env_var(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, name)): Path<(i32, String)>,
) -> ServerResult<StatusCode> {
    state
        .core
        .services
        .delete_service_env_var(id, &name, &auth)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
