use serde::Serialize;
use serde_json::json;

use crate::error::AppError;

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_FIRST_NAME_LENGTH: usize = 100;
pub const MAX_SOURCE_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Trimmed, lower-cased email.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Check an already normalised email address.
pub fn validate_email(email: &str) -> Result<(), FieldError> {
    if email.is_empty() {
        return Err(FieldError::new("email", "Email is required"));
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(FieldError::new("email", "Email is too long"));
    }
    let invalid = || FieldError::new("email", "Please enter a valid email address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_first_name(first_name: &str) -> Result<(), FieldError> {
    if first_name.chars().count() > MAX_FIRST_NAME_LENGTH {
        return Err(FieldError::new(
            "firstName",
            format!("First name must be at most {} characters", MAX_FIRST_NAME_LENGTH),
        ));
    }
    Ok(())
}

pub fn validate_source(source: &str) -> Result<(), FieldError> {
    if source.chars().count() > MAX_SOURCE_LENGTH {
        return Err(FieldError::new(
            "source",
            format!("Source must be at most {} characters", MAX_SOURCE_LENGTH),
        ));
    }
    Ok(())
}

/// Collect field errors into the 400 envelope, or `Ok` if there are none.
pub fn into_result(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(AppError::validation_with_details(
        "Invalid subscription request",
        json!(errors),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        for email in ["test@example.com", "first.last+tag@sub.example.co.uk"] {
            assert!(validate_email(email).is_ok(), "{}", email);
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in [
            "",
            "plainaddress",
            "@example.com",
            "a@b@example.com",
            "user@localhost",
            "user@example..com",
            "user@.example.com",
            "us er@example.com",
        ] {
            assert!(validate_email(email).is_err(), "{}", email);
        }
    }

    #[test]
    fn rejects_overlong_email() {
        let email = format!("{}@example.com", "a".repeat(250));
        assert_eq!(validate_email(&email).unwrap_err().message, "Email is too long");
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  Test@Example.COM "), "test@example.com");
    }

    #[test]
    fn first_name_length_is_bounded() {
        assert!(validate_first_name(&"x".repeat(100)).is_ok());
        assert_eq!(validate_first_name(&"x".repeat(101)).unwrap_err().field, "firstName");
    }

    #[test]
    fn field_errors_become_validation_details() {
        let err = into_result(vec![FieldError::new("email", "Email is required")]).unwrap_err();
        match err {
            AppError::Validation { details, .. } => {
                assert_eq!(details.unwrap()[0]["field"], "email");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(into_result(Vec::new()).is_ok());
    }
}
