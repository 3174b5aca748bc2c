use serde::{Deserialize, Serialize};
use validator::Validate;

/// Credentials for one container registry. The password is accepted on
/// create and never echoed back in listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ContainerRegistry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[validate(length(min = 1, message = "url cannot be empty"))]
    pub url: String,
    #[validate(length(min = 1, message = "username cannot be empty"))]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}
