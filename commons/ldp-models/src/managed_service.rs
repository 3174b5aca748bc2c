use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_dns1123_label;

/// A platform-owned data store backed by a StatefulSet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ManagedService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[validate(custom(function = validate_dns1123_label))]
    pub project: String,
    #[validate(custom(function = validate_dns1123_label))]
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ManagedServiceType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ManagedServiceType {
    Postgres,
    Mysql,
    Mongo,
    Redis,
    Rabbitmq,
}

impl ManagedServiceType {
    pub const ALL: [ManagedServiceType; 5] = [
        ManagedServiceType::Postgres,
        ManagedServiceType::Mysql,
        ManagedServiceType::Mongo,
        ManagedServiceType::Redis,
        ManagedServiceType::Rabbitmq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedServiceType::Postgres => "postgres",
            ManagedServiceType::Mysql => "mysql",
            ManagedServiceType::Mongo => "mongo",
            ManagedServiceType::Redis => "redis",
            ManagedServiceType::Rabbitmq => "rabbitmq",
        }
    }
}

impl fmt::Display for ManagedServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagedServiceType {
    type Err = UnknownManagedServiceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManagedServiceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownManagedServiceType(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown managed service type: {0}")]
pub struct UnknownManagedServiceType(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_string_roundtrip() {
        for t in ManagedServiceType::ALL {
            assert_eq!(t.as_str().parse::<ManagedServiceType>().unwrap(), t);
        }
        assert!("cassandra".parse::<ManagedServiceType>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_type_tag() {
        let ms: ManagedService = serde_json::from_str(
            r#"{"project":"p","name":"pg","type":"postgres"}"#,
        )
        .unwrap();
        assert_eq!(ms.service_type, ManagedServiceType::Postgres);
    }
}
