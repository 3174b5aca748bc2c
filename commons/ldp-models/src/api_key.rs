use serde::{Deserialize, Serialize};
use validator::Validate;

/// An opaque API credential. The key string itself is the identifier and
/// is only returned once, on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ApiKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
}
