use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

#[derive(Debug, Clone, FromRow)]
pub struct ProjectEntity {
    pub id: String,
    pub invite_code: String,
}

/// Env vars live embedded in the service row as a JSONB array; exactly one
/// of `value`/`secret` is set per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVarRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceEntity {
    pub id: i32,
    pub project_id: String,
    pub name: String,
    pub image: String,
    pub port: i32,
    pub public_api_prefix: Option<String>,
    pub env_vars: Json<Vec<EnvVarRecord>>,
    pub replicas: i32,
}

/// Insert payload for a service; the id is assigned by the database.
#[derive(Debug, Clone)]
pub struct NewService {
    pub project_id: String,
    pub name: String,
    pub image: String,
    pub port: i32,
    pub public_api_prefix: Option<String>,
    pub env_vars: Vec<EnvVarRecord>,
    pub replicas: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct ManagedServiceEntity {
    pub id: i32,
    pub project_id: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub service_type: String,
}

#[derive(Debug, Clone)]
pub struct NewManagedService {
    pub project_id: String,
    pub name: String,
    pub service_type: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SecretEntity {
    pub id: i32,
    pub project_id: String,
    pub name: String,
    pub value: String,
    pub managed_service_id: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ContainerRegistryEntity {
    pub id: i32,
    pub project_id: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyEntity {
    pub id: String,
    pub username: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_record_omits_absent_source() {
        let record = EnvVarRecord {
            name: "PW".into(),
            value: None,
            secret: Some("DB_PASS".into()),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"PW","secret":"DB_PASS"}"#);
    }
}
