//! Name rules shared by the API layer and the cluster projection.
//!
//! Projects and services become Kubernetes object names directly, so they
//! must be valid DNS-1123 labels. Secret names additionally pass through
//! [`sanitize_secret_name`] before being used as cluster object names;
//! names whose sanitised form is still not a valid label are rejected at
//! validation time rather than silently mangled further.

use validator::ValidationError;

const DNS1123_MAX_LEN: usize = 63;

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both
/// ends, at most 63 characters.
pub fn is_dns1123_label(value: &str) -> bool {
    if value.is_empty() || value.len() > DNS1123_MAX_LEN {
        return false;
    }
    let bytes = value.as_bytes();
    if !bytes[0].is_ascii_lowercase() && !bytes[0].is_ascii_digit() {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// Cluster-side name of a user secret: lowercased, with '_' replaced by '-'.
pub fn sanitize_secret_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

pub fn validate_dns1123_label(value: &str) -> Result<(), ValidationError> {
    if is_dns1123_label(value) {
        Ok(())
    } else {
        Err(ValidationError::new("dns1123")
            .with_message("must be a valid DNS-1123 label".into()))
    }
}

/// A secret name is acceptable when its sanitised form is a DNS-1123 label.
pub fn validate_secret_name(value: &str) -> Result<(), ValidationError> {
    if is_dns1123_label(&sanitize_secret_name(value)) {
        Ok(())
    } else {
        Err(ValidationError::new("secret_name")
            .with_message("must sanitise to a valid DNS-1123 label".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_labels() {
        assert!(is_dns1123_label("proj-a"));
        assert!(is_dns1123_label("a"));
        assert!(is_dns1123_label("0abc9"));
    }

    #[test]
    fn rejects_bad_labels() {
        assert!(!is_dns1123_label(""));
        assert!(!is_dns1123_label("-leading"));
        assert!(!is_dns1123_label("trailing-"));
        assert!(!is_dns1123_label("UpperCase"));
        assert!(!is_dns1123_label("under_score"));
        assert!(!is_dns1123_label(&"x".repeat(64)));
    }

    #[test]
    fn sanitises_underscores_and_case() {
        assert_eq!(sanitize_secret_name("DB_PASS"), "db-pass");
        assert_eq!(sanitize_secret_name("already-ok"), "already-ok");
    }

    #[test]
    fn secret_names_validate_on_sanitised_form() {
        assert!(validate_secret_name("DB_PASS").is_ok());
        assert!(validate_secret_name("pg-password").is_ok());
        assert!(validate_secret_name("has space").is_err());
        assert!(validate_secret_name("_leading").is_err());
    }
}
