use envconfig::Envconfig;
use ldp_observability::TracingConfig;
use ldp_storage::DbConfig;

/// Environment-driven configuration; dotted config keys become
/// underscore-separated variable names (`postgres.host` → `POSTGRES_HOST`).
#[derive(Debug, Clone, Envconfig)]
pub struct AppConfig {
    #[envconfig(from = "SERVER_PORT", default = "8080")]
    pub server_port: u16,

    #[envconfig(from = "PROFILE", default = "dev")]
    pub profile: String,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Base domain for public ingress hosts and TLS certificates.
    #[envconfig(from = "DOMAIN", default = "letsdeploy.space")]
    pub domain: String,

    #[envconfig(from = "POSTGRES_HOST")]
    pub postgres_host: String,

    #[envconfig(from = "POSTGRES_USERNAME")]
    pub postgres_username: String,

    #[envconfig(from = "POSTGRES_PASSWORD")]
    pub postgres_password: String,

    #[envconfig(from = "POSTGRES_DATABASE")]
    pub postgres_database: String,

    #[envconfig(from = "KUBERNETES_IN_CLUSTER", default = "false")]
    pub kubernetes_in_cluster: bool,

    #[envconfig(from = "KUBERNETES_MASTER_URL")]
    pub kubernetes_master_url: Option<String>,

    #[envconfig(from = "REDISCLIENT_HOST")]
    pub redis_host: String,

    #[envconfig(from = "OIDC_PROVIDER")]
    pub oidc_provider: String,

    #[envconfig(from = "OIDC_USERNAME_CLAIM", default = "preferred_username")]
    pub oidc_username_claim: String,

    #[envconfig(from = "TLS_ENABLED", default = "false")]
    pub tls_enabled: bool,

    #[envconfig(from = "TLS_CLUSTER_ISSUER", default = "")]
    pub tls_cluster_issuer: String,
}

impl AppConfig {
    pub fn load_from_env() -> anyhow::Result<Self> {
        Ok(Self::init_from_env()?)
    }

    pub fn db(&self) -> DbConfig {
        DbConfig {
            host: self.postgres_host.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            database: self.postgres_database.clone(),
        }
    }

    pub fn tracing(&self) -> TracingConfig {
        TracingConfig {
            service_name: "letsdeploy".to_string(),
            log_level: self.log_level.clone(),
            json_format: self.profile != "dev",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_logging_everywhere_but_dev() {
        let mut cfg = AppConfig {
            server_port: 8080,
            profile: "dev".into(),
            log_level: "info".into(),
            domain: "letsdeploy.space".into(),
            postgres_host: "localhost".into(),
            postgres_username: "u".into(),
            postgres_password: "p".into(),
            postgres_database: "d".into(),
            kubernetes_in_cluster: false,
            kubernetes_master_url: None,
            redis_host: "localhost".into(),
            oidc_provider: "https://idp.example.com/realm".into(),
            oidc_username_claim: "preferred_username".into(),
            tls_enabled: false,
            tls_cluster_issuer: String::new(),
        };
        assert!(!cfg.tracing().json_format);
        cfg.profile = "prod".into();
        assert!(cfg.tracing().json_format);
    }
}
