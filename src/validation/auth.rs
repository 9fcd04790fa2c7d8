use garde::Validate;

use crate::error::{AppError, Result};

/// The minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 10;
/// The maximum password length in characters.
pub const MAX_PASSWORD_LEN: usize = 128;
/// How many of the four character classes a password must mix.
pub const MIN_PASSWORD_CLASSES: usize = 3;

/// Validates a username.
pub fn validate_username(username: &str) -> Result<()> {
    if username.chars().count() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.chars().count() > 50 {
        return Err(AppError::Validation(
            "Username must be at most 50 characters".to_string(),
        ));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a display name. Empty means "not set".
pub fn validate_display_name(display_name: &str) -> Result<()> {
    if display_name.chars().count() > 100 {
        return Err(AppError::Validation(
            "Display name must be at most 100 characters".to_string(),
        ));
    }

    if display_name.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "Display name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

#[derive(Validate)]
struct EmailAddress {
    #[garde(email, length(max = 254))]
    email: String,
}

/// Validates the format of an (already normalized) email address.
pub fn validate_email(email: &str) -> Result<()> {
    EmailAddress {
        email: email.to_string(),
    }
    .validate()
    .map_err(|_| AppError::Validation("Invalid email address".to_string()))
}

/// Trims and lower-cases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates a password against the password policy.
///
/// Length 10 to 128, and at least three of: lowercase, uppercase, digit,
/// symbol.
pub fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();

    if len < MIN_PASSWORD_LEN {
        return Err(AppError::WeakPassword(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    if len > MAX_PASSWORD_LEN {
        return Err(AppError::WeakPassword(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        )));
    }

    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let classes = [has_lower, has_upper, has_digit, has_symbol]
        .iter()
        .filter(|present| **present)
        .count();

    if classes < MIN_PASSWORD_CLASSES {
        return Err(AppError::WeakPassword(format!(
            "Password must mix at least {} of: lowercase letters, uppercase letters, digits, symbols",
            MIN_PASSWORD_CLASSES
        )));
    }

    Ok(())
}
