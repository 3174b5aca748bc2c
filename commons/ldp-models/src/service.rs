use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_dns1123_label;

/// A user-declared container workload: one Deployment plus a ClusterIP
/// Service, and an Ingress when `public_api_prefix` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[validate(custom(function = validate_dns1123_label))]
    pub project: String,
    #[validate(custom(function = validate_dns1123_label))]
    pub name: String,
    #[validate(length(min = 1, message = "image cannot be empty"))]
    pub image: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_api_prefix: Option<String>,
    #[serde(default)]
    pub env_vars: Vec<EnvVar>,
    #[serde(default = "default_replicas")]
    #[validate(range(min = 0, max = 10))]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

/// An environment variable carries either a literal value or a reference
/// to a project secret, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVar {
    pub name: String,
    #[serde(flatten)]
    pub source: EnvVarSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EnvVarSource {
    Value { value: String },
    Secret { secret: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_roundtrips_value_and_secret() {
        let v: EnvVar =
            serde_json::from_str(r#"{"name":"A","value":"x"}"#).unwrap();
        assert_eq!(v.source, EnvVarSource::Value { value: "x".into() });

        let s: EnvVar =
            serde_json::from_str(r#"{"name":"PW","secret":"DB_PASS"}"#)
                .unwrap();
        assert_eq!(
            s.source,
            EnvVarSource::Secret { secret: "DB_PASS".into() }
        );
    }

    #[test]
    fn env_var_requires_a_source() {
        assert!(serde_json::from_str::<EnvVar>(r#"{"name":"A"}"#).is_err());
    }

    #[test]
    fn replicas_default_to_one() {
        let svc: Service = serde_json::from_str(
            r#"{"project":"p","name":"api","image":"nginx:1","port":8080}"#,
        )
        .unwrap();
        assert_eq!(svc.replicas, 1);
        assert!(svc.env_vars.is_empty());
    }
}
