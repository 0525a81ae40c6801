use std::sync::OnceLock;

use regex::Regex;

use shared_models::error::AppError;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_match(email)
}

/// Trims and lower-cases an email address, rejecting malformed ones.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let normalized = email.trim().to_lowercase();
    if is_valid_email(&normalized) {
        Ok(normalized)
    } else {
        Err(AppError::ValidationError(format!("Invalid email address: {}", email.trim())))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::ValidationError(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane.doe+clinic@example.ie"));
        assert!(!is_valid_email("jane.doe@"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(250))));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM ").unwrap(), "jane@example.com");
        assert_matches!(normalize_email("nope"), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("first_name", "Ann").is_ok());
        assert_matches!(
            require_non_empty("first_name", "   "),
            Err(AppError::ValidationError(msg)) if msg == "first_name must not be empty"
        );
    }
}
