pub mod handlers;
pub mod logs;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{Json, Router, middleware::from_fn_with_state};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::Core;
use middleware::{AuthVerifier, auth_middleware};

#[derive(Clone)]
pub struct AppState {
    pub core: Core,
    pub auth: Arc<AuthVerifier>,
}

pub struct ApiServer {
    app: Router,
    port: u16,
}

impl ApiServer {
    pub fn new(core: Core, auth: Arc<AuthVerifier>, port: u16) -> Self {
        let state = AppState { core, auth };

        let api = Router::new()
            // Projects
            .route(
                "/projects",
                get(handlers::project::get_user_projects)
                    .post(handlers::project::create_project),
            )
            .route(
                "/projects/{id}",
                get(handlers::project::get_project_info)
                    .put(handlers::project::regenerate_invite_code)
                    .delete(handlers::project::delete_project),
            )
            .route(
                "/projects/{id}/participants",
                get(handlers::project::get_participants),
            )
            .route(
                "/projects/{id}/participants/{username}",
                put(handlers::project::add_participant)
                    .delete(handlers::project::remove_participant),
            )
            .route(
                "/invitations/{code}",
                post(handlers::project::join_project),
            )
            // Secrets
            .route(
                "/projects/{id}/secrets",
                get(handlers::project::get_secrets)
                    .post(handlers::project::create_secret),
            )
            .route(
                "/projects/{id}/secrets/{name}",
                delete(handlers::project::delete_secret),
            )
            // Container registries
            .route(
                "/projects/{id}/registries",
                get(handlers::registry::get_registries)
                    .post(handlers::registry::add_registry),
            )
            .route(
                "/projects/{id}/registries/{registry_id}",
                delete(handlers::registry::delete_registry),
            )
            // Services
            .route(
                "/projects/{id}/services",
                get(handlers::service::get_project_services),
            )
            .route("/services", post(handlers::service::create_service))
            .route(
                "/services/{id}",
                get(handlers::service::get_service)
                    .put(handlers::service::update_service)
                    .delete(handlers::service::delete_service),
            )
            .route(
                "/services/{id}/status",
                get(handlers::service::get_service_status),
            )
            .route(
                "/services/{id}/restart",
                post(handlers::service::restart_service),
            )
            .route(
                "/services/{id}/environment",
                get(handlers::service::get_env_vars)
                    .put(handlers::service::set_env_var),
            )
            .route(
                "/services/{id}/environment/{name}",
                delete(handlers::service::delete_env_var),
            )
            // Managed services
            .route(
                "/projects/{id}/managed_services",
                get(handlers::managed_service::get_project_managed_services),
            )
            .route(
                "/managed_services",
                post(handlers::managed_service::create_managed_service),
            )
            .route(
                "/managed_services/{id}",
                get(handlers::managed_service::get_managed_service).delete(
                    handlers::managed_service::delete_managed_service,
                ),
            )
            .route(
                "/managed_services/{id}/status",
                get(handlers::managed_service::get_managed_service_status),
            )
            // MongoDB users
            .route(
                "/managed_services/{id}/users",
                get(handlers::mongo::get_users)
                    .post(handlers::mongo::create_user),
            )
            .route(
                "/managed_services/{id}/users/{username}",
                get(handlers::mongo::get_user)
                    .put(handlers::mongo::update_user)
                    .delete(handlers::mongo::delete_user),
            )
            // API keys & temp tokens
            .route(
                "/api_keys",
                get(handlers::api_key::get_api_keys)
                    .post(handlers::api_key::create_api_key),
            )
            .route(
                "/api_keys/{key}",
                delete(handlers::api_key::delete_api_key),
            )
            .route("/tokens", post(handlers::token::create_temp_token))
            .layer(from_fn_with_state(state.clone(), auth_middleware));

        // The websocket handshake authenticates with a temp token instead
        // of headers, so it stays outside the auth middleware.
        let ws = Router::new()
            .route("/services/{id}/logs", get(logs::service_logs));

        let app = Router::new()
            .route("/health", get(health))
            .nest("/api/v1", api.merge(ws))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        ApiServer { app, port }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("letsdeploy API server listening on {addr}");
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    /// Hand out the router so tests can drive it on an ephemeral port.
    pub fn into_router(self) -> Router {
        self.app
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}
