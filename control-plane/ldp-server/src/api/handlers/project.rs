use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::{NewSecret, Project, ProjectInfo, Secret};

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_user_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
) -> ServerResult<Json<Vec<Project>>> {
    Ok(Json(state.core.projects.get_user_projects(&auth).await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Json(project): Json<Project>,
) -> ServerResult<(StatusCode, Json<Project>)> {
    let created = state.core.projects.create_project(project, &auth).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_project_info(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
) -> ServerResult<Json<ProjectInfo>> {
    Ok(Json(state.core.projects.get_project_info(&id, &auth).await?))
}

pub async fn regenerate_invite_code(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
) -> ServerResult<Json<ProjectInfo>> {
    Ok(Json(
        state
            .core
            .projects
            .regenerate_invite_code(&id, &auth)
            .await?,
    ))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    state.core.projects.delete_project(&id, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_participants(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<String>>> {
    Ok(Json(state.core.projects.get_participants(&id, &auth).await?))
}

pub async fn add_participant(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, username)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state
        .core
        .projects
        .add_participant(&id, &username, &auth)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn remove_participant(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, username)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state
        .core
        .projects
        .remove_participant(&id, &username, &auth)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_project(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(code): Path<String>,
) -> ServerResult<Json<Project>> {
    Ok(Json(state.core.projects.join_project(&code, &auth).await?))
}

pub async fn get_secrets(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<Secret>>> {
    Ok(Json(state.core.projects.get_secrets(&id, &auth).await?))
}

pub async fn create_secret(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<String>,
    Json(secret): Json<NewSecret>,
) -> ServerResult<(StatusCode, Json<Secret>)> {
    let created =
        state.core.projects.create_secret(&id, secret, &auth).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_secret(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, name)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state.core.projects.delete_secret(&id, &name, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}
