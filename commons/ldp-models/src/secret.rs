use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_secret_name;

/// Secret values never leave the server; listings expose name and
/// ownership only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Secret {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_service_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct NewSecret {
    #[validate(custom(function = validate_secret_name))]
    pub name: String,
    pub value: String,
}
