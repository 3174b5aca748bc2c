use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use ldp_models::MongoDbUser;

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

pub async fn get_users(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
) -> ServerResult<Json<Vec<MongoDbUser>>> {
    Ok(Json(state.core.mongodb.get_mongodb_users(id, &auth).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, username)): Path<(i32, String)>,
) -> ServerResult<Json<MongoDbUser>> {
    Ok(Json(
        state
            .core
            .mongodb
            .get_mongodb_user(id, &username, &auth)
            .await?,
    ))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path(id): Path<i32>,
    Json(user): Json<MongoDbUser>,
) -> ServerResult<(StatusCode, Json<MongoDbUser>)> {
    let created =
        state.core.mongodb.create_mongodb_user(id, user, &auth).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, username)): Path<(i32, String)>,
    Json(mut user): Json<MongoDbUser>,
) -> ServerResult<Json<MongoDbUser>> {
    user.username = username;
    Ok(Json(
        state.core.mongodb.update_mongodb_user(id, user, &auth).await?,
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
    Path((id, username)): Path<(i32, String)>,
) -> ServerResult<StatusCode> {
    state
        .core
        .mongodb
        .delete_mongodb_user(id, &username, &auth)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
