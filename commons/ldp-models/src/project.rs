use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::managed_service::ManagedService;
use crate::service::Service;
use crate::validation::validate_dns1123_label;

/// A project is the tenant unit; its id doubles as the cluster namespace
/// name, which is why it must be a DNS-1123 label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Project {
    #[validate(custom(function = validate_dns1123_label))]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    pub id: String,
    pub invite_code: String,
    pub participants: Vec<String>,
    pub services: Vec<Service>,
    pub managed_services: Vec<ManagedService>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_must_be_namespace_safe() {
        assert!(Project { id: "proj-a".into() }.validate().is_ok());
        assert!(Project { id: "Bad_Name".into() }.validate().is_err());
    }
}
