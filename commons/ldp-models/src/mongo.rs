use serde::{Deserialize, Serialize};

/// A MongoDB database user managed through the admin protocol of an
/// in-cluster Mongo managed service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MongoDbUser {
    pub username: String,
    /// Name of the project secret holding the password. Required on
    /// create; optional on update (roles-only change).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<String>,
    #[serde(default)]
    pub roles: Vec<MongoDbRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MongoDbRole {
    pub db: String,
    pub role: MongoDbRoleName,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MongoDbRoleName {
    Read,
    ReadWrite,
    DbAdmin,
    DbOwner,
    UserAdmin,
}

impl MongoDbRoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MongoDbRoleName::Read => "read",
            MongoDbRoleName::ReadWrite => "readWrite",
            MongoDbRoleName::DbAdmin => "dbAdmin",
            MongoDbRoleName::DbOwner => "dbOwner",
            MongoDbRoleName::UserAdmin => "userAdmin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(MongoDbRoleName::Read),
            "readWrite" => Some(MongoDbRoleName::ReadWrite),
            "dbAdmin" => Some(MongoDbRoleName::DbAdmin),
            "dbOwner" => Some(MongoDbRoleName::DbOwner),
            "userAdmin" => Some(MongoDbRoleName::UserAdmin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_serialize_in_mongo_convention() {
        let role = MongoDbRole {
            db: "app".into(),
            role: MongoDbRoleName::ReadWrite,
        };
        let json = serde_json::to_string(&role).unwrap();
        assert_eq!(json, r#"{"db":"app","role":"readWrite"}"#);
    }
}
