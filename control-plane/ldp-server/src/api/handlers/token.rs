use axum::Json;
use axum::extract::{Extension, State};
use serde::Serialize;

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::ServerResult;

#[derive(Serialize)]
pub struct TempTokenResponse {
    pub token: String,
}

/// First leg of the log-stream handshake: browsers cannot set headers on
/// websocket upgrades, so they trade their credentials for a short-lived
/// token here.
pub async fn create_temp_token(
    State(state): State<AppState>,
    Extension(auth): Extension<Authentication>,
) -> ServerResult<Json<TempTokenResponse>> {
    let token = state.core.tokens.create_temp_token(&auth).await?;
    Ok(Json(TempTokenResponse { token }))
}
