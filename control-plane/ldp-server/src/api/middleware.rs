//! Request authentication: OIDC bearer tokens validated against the
//! provider's JWKS, or opaque API keys resolved through the store.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::AppState;
use crate::core::Authentication;
use crate::errors::{ServerError, ServerResult};

pub const API_KEY_HEADER: &str = "API-Key";

/// Tolerated clock skew when validating token timestamps.
const CLOCK_SKEW_SECONDS: u64 = 3;

#[derive(Debug, Deserialize)]
struct OidcDiscovery {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

pub struct AuthVerifier {
    issuer: String,
    username_claim: String,
    keys: HashMap<String, DecodingKey>,
}

impl AuthVerifier {
    /// Fetch the provider's signing keys once at boot; key rotation means
    /// a restart, as it did for the original deployment.
    pub async fn from_oidc_provider(
        provider: &str,
        username_claim: &str,
    ) -> anyhow::Result<Self> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            provider.trim_end_matches('/')
        );
        let discovery: OidcDiscovery = reqwest::get(&discovery_url)
            .await?
            .error_for_status()?
            .json()
            .await?;
        let jwks: JwksDocument = reqwest::get(&discovery.jwks_uri)
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::new();
        for key in jwks.keys {
            if key.kty != "RSA" {
                continue;
            }
            let (Some(kid), Some(n), Some(e)) = (key.kid, key.n, key.e)
            else {
                continue;
            };
            keys.insert(kid, DecodingKey::from_rsa_components(&n, &e)?);
        }
        if keys.is_empty() {
            anyhow::bail!("OIDC provider returned no usable RSA keys");
        }
        info!(provider, key_count = keys.len(), "OIDC signing keys loaded");
        Ok(AuthVerifier {
            issuer: provider.to_string(),
            username_claim: username_claim.to_string(),
            keys,
        })
    }

    /// Validate an RS256 bearer token and extract the username claim.
    pub fn verify(&self, token: &str) -> ServerResult<String> {
        let header = decode_header(token).map_err(|err| {
            ServerError::wrap(err, 403, "Failed to authenticate user")
        })?;
        let kid = header.kid.ok_or_else(|| {
            ServerError::forbidden("token has no key id")
        })?;
        let key = self.keys.get(&kid).ok_or_else(|| {
            ServerError::forbidden("token signed by an unknown key")
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = CLOCK_SKEW_SECONDS;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<serde_json::Value>(token, key, &validation)
            .map_err(|err| {
                ServerError::wrap(err, 403, "Failed to authenticate user")
            })?;
        data.claims
            .get(&self.username_claim)
            .and_then(|claim| claim.as_str())
            .map(String::from)
            .ok_or_else(|| {
                ServerError::forbidden("token is missing the username claim")
            })
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| {
            value.to_str().map(String::from).map_err(|_| {
                ServerError::unauthorized("malformed Authorization header")
            })
        })
        .transpose()?;
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| {
            value.to_str().map(String::from).map_err(|_| {
                ServerError::unauthorized("malformed API-Key header")
            })
        })
        .transpose()?;

    if let Some(value) = bearer {
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            ServerError::unauthorized(
                "Authorization header does not contain Bearer token",
            )
        })?;
        let username = state.auth.verify(token)?;
        debug!(username, "user authenticated");
        request.extensions_mut().insert(Authentication::user(username));
        return Ok(next.run(request).await);
    }

    if let Some(key) = api_key {
        let username = state
            .core
            .api_keys
            .get_username_by_api_key(&key)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ServerError::unauthorized("Invalid API key")
                } else {
                    err
                }
            })?;
        debug!(username, "API key authenticated");
        request.extensions_mut().insert(Authentication::user(username));
        return Ok(next.run(request).await);
    }

    Err(ServerError::unauthorized("Authentication is required"))
}
